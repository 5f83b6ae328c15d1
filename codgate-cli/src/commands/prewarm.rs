//! Prewarm command - convert datasets ahead of demand with a progress bar.

use std::time::Duration;

use codgate::{DatasetRef, PrewarmPlan, PrewarmReport};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::common::{parse_admin_levels, prewarm_formats};
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Arguments for the prewarm command.
pub struct PrewarmArgs {
    pub level: u32,
    pub regions: Vec<String>,
    pub admin: String,
    pub formats: Vec<String>,
    pub concurrency: Option<usize>,
}

impl PrewarmArgs {
    fn plan(&self) -> Result<PrewarmPlan, CliError> {
        let admin_levels = parse_admin_levels(&self.admin)?;
        let mut datasets = Vec::new();
        for region in &self.regions {
            for admin in admin_levels.clone() {
                datasets.push(DatasetRef::new(self.level, region, admin)?);
            }
        }
        Ok(PrewarmPlan::new(datasets, &prewarm_formats(&self.formats)))
    }
}

/// Run the prewarm command.
pub fn run(options: &GlobalOptions, args: PrewarmArgs) -> Result<(), CliError> {
    let plan = args.plan()?;
    let runner = CliRunner::new(options)?;
    runner.log_startup("prewarm");
    let gateway = runner.gateway()?;
    let concurrency = args
        .concurrency
        .unwrap_or(runner.config().prewarm_concurrency);

    let bar = ProgressBar::new(plan.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let report = runner.runtime().block_on(async {
        let mut handle = gateway.start_prewarm(plan, concurrency);
        let cancel = handle.cancellation();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Cancelling prewarm, waiting for running conversions");
                cancel.cancel();
            }
        });

        while let Some(outcome) = handle.progress_receiver().recv().await {
            let mark = if outcome.is_success() { "ok" } else { "failed" };
            bar.set_message(format!("{} {}", outcome.label(), mark));
            bar.inc(1);
        }
        handle.wait().await
    });

    bar.finish_and_clear();
    print_report(&report);

    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(CliError::Prewarm {
            failed: report.failures.len(),
            planned: report.planned,
        })
    }
}

fn print_report(report: &PrewarmReport) {
    println!("Prewarm Summary");
    println!("───────────────");
    println!("  Planned:        {}", report.planned);
    println!("  Converted:      {}", report.materialized);
    println!("  Already cached: {}", report.already_cached);
    println!("  Failed:         {}", report.failures.len());
    if report.skipped > 0 {
        println!("  Skipped:        {}", report.skipped);
    }
    for failure in &report.failures {
        if let Err(e) = &failure.result {
            println!("    {}: {}", failure.label(), e);
        }
    }
}

//! Bulk cache warming.
//!
//! Prewarm resolves every (dataset, format) pair of a plan through the
//! normal [`Gateway::resolve`] protocol, so it honours the cache, the
//! single-flight table and every validation a client request would. Pairs
//! already cached cost one probe each.
//!
//! # Example
//!
//! ```ignore
//! let plan = PrewarmPlan::new(datasets, PREWARM_FORMATS);
//! let mut handle = gateway.start_prewarm(plan, 4);
//!
//! while let Some(outcome) = handle.progress_receiver().recv().await {
//!     println!("{} {}", outcome.label(), outcome.is_success());
//! }
//! let report = handle.wait().await;
//! ```

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dataset::DatasetRef;
use crate::error::GatewayResult;
use crate::gateway::{FeatureRequest, Gateway, Resolution, ResolutionKind};
use crate::options::ConversionOptions;

/// Cross product of datasets and formats to warm.
#[derive(Debug, Clone, Default)]
pub struct PrewarmPlan {
    requests: Vec<FeatureRequest>,
}

impl PrewarmPlan {
    /// Plan every format for every dataset, with default conversion options.
    pub fn new<S: AsRef<str>>(datasets: Vec<DatasetRef>, formats: &[S]) -> Self {
        let requests = datasets
            .into_iter()
            .flat_map(|dataset| {
                formats.iter().map(move |format| FeatureRequest {
                    dataset: dataset.clone(),
                    format: crate::format::normalize(format.as_ref()),
                    options: ConversionOptions::new(),
                })
            })
            .collect();
        Self { requests }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> &[FeatureRequest] {
        &self.requests
    }
}

/// Result of warming one pair.
#[derive(Debug, Clone)]
pub struct PrewarmOutcome {
    pub request: FeatureRequest,
    pub result: GatewayResult<Resolution>,
}

impl PrewarmOutcome {
    /// Short label such as `level-1/abc_adm2.geojson`.
    pub fn label(&self) -> String {
        format!(
            "{}.{}",
            self.request.dataset,
            self.request.format.canonical_suffix()
        )
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a finished prewarm run.
#[derive(Debug, Clone, Default)]
pub struct PrewarmReport {
    pub planned: usize,
    pub materialized: usize,
    pub already_cached: usize,
    pub failures: Vec<PrewarmOutcome>,
    /// Pairs never attempted because the run was cancelled.
    pub skipped: usize,
}

impl PrewarmReport {
    fn record(&mut self, outcome: &PrewarmOutcome) {
        match &outcome.result {
            Ok(resolution) => match resolution.kind {
                ResolutionKind::Materialized => self.materialized += 1,
                ResolutionKind::CacheHit | ResolutionKind::Native => self.already_cached += 1,
            },
            Err(_) => self.failures.push(outcome.clone()),
        }
    }

    pub fn attempted(&self) -> usize {
        self.materialized + self.already_cached + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }
}

/// Handle to a running prewarm task.
pub struct PrewarmHandle {
    progress_rx: mpsc::UnboundedReceiver<PrewarmOutcome>,
    cancellation: CancellationToken,
    task: JoinHandle<PrewarmReport>,
}

impl PrewarmHandle {
    /// Receiver of per-pair outcomes, in completion order.
    pub fn progress_receiver(&mut self) -> &mut mpsc::UnboundedReceiver<PrewarmOutcome> {
        &mut self.progress_rx
    }

    /// Stop starting new pairs; pairs already running finish.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Wait for the run to finish and return its report.
    pub async fn wait(self) -> PrewarmReport {
        drop(self.progress_rx);
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Prewarm task aborted");
                PrewarmReport::default()
            }
        }
    }
}

impl Gateway {
    /// Warm every pair of `plan` with at most `concurrency` resolutions in
    /// flight, reporting each outcome through `on_outcome`.
    pub async fn prewarm<F>(
        &self,
        plan: PrewarmPlan,
        concurrency: usize,
        cancellation: CancellationToken,
        mut on_outcome: F,
    ) -> PrewarmReport
    where
        F: FnMut(&PrewarmOutcome),
    {
        let planned = plan.len();
        let mut report = PrewarmReport {
            planned,
            ..Default::default()
        };
        info!(planned, concurrency, "Prewarm started");

        let mut outcomes = Box::pin(
            stream::iter(plan.requests)
                .take_until(cancellation.clone().cancelled_owned())
                .map(|request| {
                    let gateway = self.clone();
                    async move {
                        let result = gateway.resolve(&request).await;
                        PrewarmOutcome { request, result }
                    }
                })
                .buffer_unordered(concurrency.max(1)),
        );

        while let Some(outcome) = outcomes.next().await {
            if let Err(ref e) = outcome.result {
                warn!(item = %outcome.label(), error = %e, "Prewarm item failed");
            }
            report.record(&outcome);
            on_outcome(&outcome);
        }

        report.skipped = planned - report.attempted();
        info!(
            materialized = report.materialized,
            already_cached = report.already_cached,
            failed = report.failures.len(),
            skipped = report.skipped,
            "Prewarm finished"
        );
        report
    }

    /// Run [`prewarm`](Self::prewarm) on a background task.
    pub fn start_prewarm(&self, plan: PrewarmPlan, concurrency: usize) -> PrewarmHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();
        let gateway = self.clone();
        let token = cancellation.clone();

        let task = tokio::spawn(async move {
            gateway
                .prewarm(plan, concurrency, token, |outcome| {
                    // The receiver may already be gone
                    let _ = tx.send(outcome.clone());
                })
                .await
        });

        PrewarmHandle {
            progress_rx: rx,
            cancellation,
            task,
        }
    }
}

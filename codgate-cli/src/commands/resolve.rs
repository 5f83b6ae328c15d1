//! Resolve command - resolve a single request from the command line.

use codgate::{ConversionOptions, FeatureRequest};

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Arguments for the resolve command.
pub struct ResolveArgs {
    pub level: u32,
    pub iso3: String,
    pub admin: u32,
    pub format: String,
    pub simplify: Option<String>,
    pub layer_creation_options: Vec<String>,
    pub json: bool,
}

impl ResolveArgs {
    fn to_request(&self) -> Result<FeatureRequest, CliError> {
        let mut options = ConversionOptions::new();
        if let Some(tolerance) = &self.simplify {
            options = options.with_simplify(tolerance.as_str())?;
        }
        for option in &self.layer_creation_options {
            options = options.with_layer_creation_option(option.as_str())?;
        }
        Ok(FeatureRequest::new(self.level, &self.iso3, self.admin, &self.format)?.with_options(options))
    }
}

/// Run the resolve command.
pub fn run(options: &GlobalOptions, args: ResolveArgs) -> Result<(), CliError> {
    let request = args.to_request()?;
    let runner = CliRunner::new(options)?;
    runner.log_startup("resolve");
    let gateway = runner.gateway()?;

    let resolution = runner
        .runtime()
        .block_on(async move { gateway.resolve(&request).await })?;

    if args.json {
        let text = serde_json::to_string_pretty(&resolution)
            .map_err(|e| CliError::Args(e.to_string()))?;
        println!("{}", text);
    } else {
        println!("{}", resolution.url);
    }
    Ok(())
}

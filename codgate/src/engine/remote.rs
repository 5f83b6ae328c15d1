//! Remote conversion engine.
//!
//! Delegates the conversion to another conversion service over HTTP:
//!
//! ```text
//! GET {base}/ogr2ogr/{level}/{region}/{admin}?f={format}[&simplify=..][&lco=..]
//! ```
//!
//! Redirects are followed, so a service that answers with a redirect to its
//! own published artifact works as well as one that returns the bytes
//! directly. The body is streamed into the request's destination path.

use std::time::Duration;

use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::traits::{ConversionEngine, ConversionRequest, EngineError};
use crate::store::BoxFuture;

/// Default timeout for a remote conversion in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Converts by calling a remote conversion service.
#[derive(Debug, Clone)]
pub struct RemoteEngine {
    client: Client,
    base_url: String,
}

impl RemoteEngine {
    /// Create a remote engine with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, EngineError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a remote engine with a custom timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Endpoint URL (without query) for a request.
    pub fn endpoint(&self, request: &ConversionRequest) -> String {
        format!(
            "{}/ogr2ogr/{}/{}/{}",
            self.base_url,
            request.dataset.processing_level(),
            request.dataset.region_code(),
            request.dataset.admin_level()
        )
    }

    /// Query parameters for a request.
    pub fn query(&self, request: &ConversionRequest) -> Vec<(String, String)> {
        let mut query = vec![(
            "f".to_string(),
            request.format.engine_output_suffix().to_string(),
        )];
        if let Some(tolerance) = request.options.simplify() {
            query.push(("simplify".to_string(), tolerance.to_string()));
        }
        for option in request.options.layer_creation_options() {
            query.push(("lco".to_string(), option.clone()));
        }
        query
    }

    async fn download(&self, request: &ConversionRequest) -> Result<(), EngineError> {
        let url = self.endpoint(request);
        let mut response = self
            .client
            .get(&url)
            .query(&self.query(request))
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Remote {
                status: status.as_u16(),
                url,
            });
        }

        let mut file = tokio::fs::File::create(&request.destination).await?;
        let mut written = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!(url = %url, size_bytes = written, "Remote conversion downloaded");
        Ok(())
    }
}

impl ConversionEngine for RemoteEngine {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn reads_remote_sources(&self) -> bool {
        true
    }

    fn convert<'a>(
        &'a self,
        request: &'a ConversionRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            tokio::select! {
                result = self.download(request) => result,
                _ = cancel.cancelled() => Err(EngineError::Cancelled),
            }
        })
    }
}

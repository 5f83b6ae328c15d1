//! Gateway error taxonomy.
//!
//! Every failure a request can hit maps onto one [`GatewayError`] variant,
//! and every variant maps onto exactly one HTTP status via
//! [`GatewayError::status_code`]. Errors are `Clone` so that the outcome of a
//! shared conversion can be broadcast to every caller waiting on it.

use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced by the gateway to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The request parameters cannot address a dataset or format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The canonical source asset is missing or could not be fetched.
    #[error("source asset {key} unavailable: {reason}")]
    UpstreamUnavailable { key: String, reason: String },

    /// The cache existence probe failed (network error, timeout, unexpected status).
    ///
    /// Kept distinct from a negative probe so that store outages never
    /// trigger a wave of reconversions.
    #[error("cache store unavailable while probing {key}: {reason}")]
    StoreUnavailable { key: String, reason: String },

    /// The conversion engine exited unsuccessfully or could not be started.
    #[error("conversion engine failed: {0}")]
    ConversionEngineFailed(String),

    /// The engine reported success but produced nothing usable.
    #[error("conversion produced empty output for {0}")]
    ConversionProducedEmptyOutput(String),

    /// A directory output could not be assembled into a single archive.
    #[error("packaging failed: {0}")]
    PackagingFailed(String),

    /// Writing the finished artifact to the cache store failed.
    #[error("publish to {key} failed: {reason}")]
    PublishFailed { key: String, reason: String },

    /// Local scratch space could not be created or read.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// The caller's deadline elapsed before a result was available.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The conversion was abandoned because no caller was left waiting for it.
    #[error("conversion cancelled")]
    Cancelled,
}

impl GatewayError {
    /// HTTP status code used when this error reaches the HTTP surface.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::ConversionProducedEmptyOutput(_) => 422,
            GatewayError::ConversionEngineFailed(_)
            | GatewayError::PackagingFailed(_)
            | GatewayError::PublishFailed { .. }
            | GatewayError::Workspace(_) => 500,
            GatewayError::UpstreamUnavailable { .. } | GatewayError::StoreUnavailable { .. } => {
                502
            }
            GatewayError::Cancelled => 503,
            GatewayError::Timeout(_) => 504,
        }
    }

    /// Short diagnostic suitable for an HTTP response body.
    ///
    /// Engine diagnostics and store reasons stay in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "Bad Request",
            GatewayError::UpstreamUnavailable { .. } => "Source Asset Unavailable",
            GatewayError::StoreUnavailable { .. } => "Cache Store Unavailable",
            GatewayError::ConversionEngineFailed(_) => "Conversion Failed",
            GatewayError::ConversionProducedEmptyOutput(_) => "Unprocessable Content",
            GatewayError::PackagingFailed(_) => "Packaging Failed",
            GatewayError::PublishFailed { .. } => "Publish Failed",
            GatewayError::Workspace(_) => "Internal Server Error",
            GatewayError::Timeout(_) => "Gateway Timeout",
            GatewayError::Cancelled => "Service Unavailable",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Workspace(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_output_is_unprocessable() {
        let err = GatewayError::ConversionProducedEmptyOutput("level-1/abc_adm2.kml".into());
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.public_message(), "Unprocessable Content");
    }

    #[test]
    fn test_upstream_errors_are_bad_gateway() {
        let upstream = GatewayError::UpstreamUnavailable {
            key: "level-1/abc_adm2.parquet".into(),
            reason: "HTTP 404".into(),
        };
        let store = GatewayError::StoreUnavailable {
            key: "level-1/abc_adm2.kml".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(upstream.status_code(), 502);
        assert_eq!(store.status_code(), 502);
        assert_ne!(upstream, store);
    }

    #[test]
    fn test_server_side_failures_are_500() {
        for err in [
            GatewayError::ConversionEngineFailed("exit status 1".into()),
            GatewayError::PackagingFailed("unreadable member".into()),
            GatewayError::PublishFailed {
                key: "k".into(),
                reason: "HTTP 500".into(),
            },
        ] {
            assert_eq!(err.status_code(), 500, "{}", err);
        }
    }

    #[test]
    fn test_display_includes_context() {
        let err = GatewayError::PublishFailed {
            key: "level-0/xyz_adm0.gpkg".into(),
            reason: "HTTP 403".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("level-0/xyz_adm0.gpkg"));
        assert!(msg.contains("HTTP 403"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: GatewayError = io_err.into();
        assert!(matches!(err, GatewayError::Workspace(_)));
        assert_eq!(err.status_code(), 500);
    }
}

//! HTTP object store backed by reqwest.
//!
//! Reads go to a public base URL (typically a CDN or an S3 website
//! endpoint). Writes, when configured, go to a separate bucket base URL
//! with a plain `PUT` of the complete object.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::traits::{content_type_for, BoxFuture, ObjectStore, StoreError};
use crate::keys::with_cache_bust;

/// Default timeout for store requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Object store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    read_base: String,
    write_base: Option<String>,
    timeout: Duration,
}

impl HttpObjectStore {
    /// Create a read-only store rooted at `read_base`.
    pub fn new(read_base: impl Into<String>) -> Result<Self, StoreError> {
        Self::with_timeout(read_base, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a read-only store with a custom request timeout.
    pub fn with_timeout(read_base: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            read_base: trim_base(read_base.into()),
            write_base: None,
            timeout,
        })
    }

    /// Enable writes by `PUT` to `write_base`.
    pub fn with_write_base(mut self, write_base: impl Into<String>) -> Self {
        let write_base = trim_base(write_base.into());
        self.write_base = if write_base.is_empty() {
            None
        } else {
            Some(write_base)
        };
        self
    }

    fn write_url(&self, key: &str) -> Option<String> {
        self.write_base
            .as_ref()
            .map(|base| format!("{}/{}", base, key))
    }

    fn map_transport(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.timeout.as_secs())
        } else {
            StoreError::Transport(e.to_string())
        }
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

impl ObjectStore for HttpObjectStore {
    fn backend_tag(&self) -> &'static str {
        "http"
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.read_base, key)
    }

    fn head_exists(&self, key: &str, bust_token: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let url = with_cache_bust(&self.public_url(key), bust_token);
        Box::pin(async move {
            let response = self
                .client
                .head(&url)
                .send()
                .await
                .map_err(|e| self.map_transport(e))?;

            let status = response.status();
            debug!(url = %url, status = status.as_u16(), "Existence probe");

            if status.is_success() {
                Ok(true)
            } else if status == StatusCode::NOT_FOUND {
                Ok(false)
            } else if status == StatusCode::FORBIDDEN {
                // S3 answers 403 instead of 404 when listing is not allowed,
                // but so does a bucket the gateway has lost access to
                warn!(url = %url, "Existence probe got 403, treating as absent");
                Ok(false)
            } else {
                Err(StoreError::Http {
                    status: status.as_u16(),
                    url,
                })
            }
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Bytes, StoreError>> {
        let url = self.public_url(key);
        let key = key.to_string();
        Box::pin(async move {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| self.map_transport(e))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(StoreError::NotFound(key));
            }
            if !status.is_success() {
                return Err(StoreError::Http {
                    status: status.as_u16(),
                    url,
                });
            }

            response.bytes().await.map_err(|e| self.map_transport(e))
        })
    }

    fn put(&self, key: &str, body: Bytes) -> BoxFuture<'_, Result<(), StoreError>> {
        let url = self.write_url(key);
        let content_type = content_type_for(key);
        Box::pin(async move {
            let url = url.ok_or_else(|| StoreError::ReadOnly(self.read_base.clone()))?;
            let size = body.len();

            let response = self
                .client
                .put(&url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body)
                .send()
                .await
                .map_err(|e| self.map_transport(e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(StoreError::Http {
                    status: status.as_u16(),
                    url,
                });
            }

            debug!(url = %url, size_bytes = size, "Object published");
            Ok(())
        })
    }
}

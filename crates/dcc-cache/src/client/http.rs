//! HTTP layer: request construction and status mapping.
//!
//! This is the ONLY place for status code handling. `client.rs` never
//! interprets status codes.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::auth::{ApiKey, API_KEY_HEADER};
use crate::error::{CacheError, CacheResult, TrustFailure};

/// User agent for dataset requests.
pub const CACHE_USER_AGENT: &str = concat!("dcc-cache/", env!("CARGO_PKG_VERSION"));

/// Longest server error body quoted in an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// HTTP backend (holds reqwest client and API key).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: ApiKey,
}

impl HttpBackend {
    pub(crate) fn new(timeout: Duration, api_key: ApiKey) -> CacheResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CACHE_USER_AGENT));
        default_headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/octet-stream"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| CacheError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, api_key })
    }

    /// GET `url` and return the body; anything but 200 is a trust-service error.
    pub(crate) async fn get_bytes(&self, url: &str) -> CacheResult<Vec<u8>> {
        let mut request = self.client.get(url);
        if let Some(key) = self.api_key.get() {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let detail: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(url, status = status.as_u16(), "unexpected response status");
            return Err(CacheError::trust_service(
                TrustFailure::Status(status.as_u16()),
                if detail.is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    format!("HTTP {}: {}", status.as_u16(), detail)
                },
            ));
        }

        let bytes = response.bytes().await.map_err(|e| {
            CacheError::trust_service(
                TrustFailure::Transport,
                format!("failed to read response body: {}", e),
            )
        })?;
        debug!(url, len = bytes.len(), "fetched");
        Ok(bytes.to_vec())
    }
}

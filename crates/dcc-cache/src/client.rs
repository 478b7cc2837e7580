//! Remote fetcher for signed datasets.
//!
//! Two independent operations: fetch and verify the detached signature,
//! and fetch the raw payload. Neither touches cache state; interpreting the
//! results is the engine's job.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::auth::ApiKey;
use crate::error::CacheResult;
use crate::types::CacheConfig;
use crate::verify::SignatureVerifier;

mod http;

pub use http::CACHE_USER_AGENT;

use http::HttpBackend;

/// Network side of a signed cache.
#[async_trait]
pub trait RemoteFetcher: Send + Sync + fmt::Debug {
    /// Fetch the detached signature and return the verified content hash.
    async fn fetch_verified_hash(&self, now: DateTime<Utc>) -> CacheResult<Vec<u8>>;

    /// Fetch the raw payload.
    async fn fetch_payload(&self) -> CacheResult<Vec<u8>>;
}

/// [`RemoteFetcher`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: HttpBackend,
    data_url: String,
    signature_url: String,
    trust_anchor: String,
    verifier: Arc<dyn SignatureVerifier>,
}

impl HttpFetcher {
    /// Create a fetcher for the endpoints in `config`.
    pub fn new(
        config: &CacheConfig,
        timeout: Duration,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> CacheResult<Self> {
        config.validate()?;
        let http = HttpBackend::new(timeout, ApiKey::from_option(config.api_key.as_deref()))?;

        Ok(Self {
            http,
            data_url: config.data_url.clone(),
            signature_url: config.signature_url.clone(),
            trust_anchor: config.trust_anchor.clone(),
            verifier,
        })
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn signature_url(&self) -> &str {
        &self.signature_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.http.api_key.is_authenticated()
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_verified_hash(&self, now: DateTime<Utc>) -> CacheResult<Vec<u8>> {
        debug!(url = %self.signature_url, "fetching detached signature");
        let body = self.http.get_bytes(&self.signature_url).await?;
        self.verifier.verify(&body, &self.trust_anchor, now)
    }

    async fn fetch_payload(&self) -> CacheResult<Vec<u8>> {
        debug!(url = %self.data_url, "fetching payload");
        self.http.get_bytes(&self.data_url).await
    }
}

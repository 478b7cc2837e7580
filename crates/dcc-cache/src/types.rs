//! Configuration types.

use std::path::PathBuf;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Names under which a dataset is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageIds {
    /// Blob (file) name of the persisted snapshot.
    pub blob_name: String,

    /// Alias of the local encryption key.
    pub key_alias: String,

    /// Alias of the item in legacy secure-item storage.
    pub legacy_alias: String,
}

/// Immutable per-dataset configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Payload endpoint.
    pub data_url: String,

    /// Detached signature endpoint.
    pub signature_url: String,

    /// Trust anchor handed to the signature verifier (Base64).
    pub trust_anchor: String,

    /// Optional API key sent as `X-Token`.
    pub api_key: Option<String>,

    /// How often to check the signature for changes.
    pub update_interval: Duration,

    /// How long a snapshot may be served without a successful check.
    pub maximum_age: Duration,

    /// Persistence identifiers.
    pub storage: StorageIds,

    /// Settings key of the persisted last-update timestamp.
    pub last_update_key: String,

    /// Encrypt the persisted snapshot.
    pub store_encrypted: bool,
}

impl CacheConfig {
    /// Check that both endpoints are absolute URLs and the anchor is set.
    pub fn validate(&self) -> CacheResult<()> {
        for (label, value) in [("data", &self.data_url), ("signature", &self.signature_url)] {
            url::Url::parse(value).map_err(|e| CacheError::Config {
                message: format!("invalid {} url {:?}: {}", label, value, e),
            })?;
        }
        if self.trust_anchor.trim().is_empty() {
            return Err(CacheError::Config {
                message: format!("no trust anchor configured for {}", self.storage.blob_name),
            });
        }
        Ok(())
    }
}

/// Remote location and credentials of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEndpoint {
    /// Payload URL (preset default when `None`).
    #[serde(default)]
    pub data_url: Option<String>,

    /// Signature URL (preset default when `None`).
    #[serde(default)]
    pub signature_url: Option<String>,

    /// Trust anchor, Base64 SPKI.
    #[serde(default)]
    pub trust_anchor: Option<String>,

    /// API key.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl DatasetEndpoint {
    /// Read `{prefix}_URL`, `{prefix}_SIGNATURE_URL`, `{prefix}_ANCHOR`, `{prefix}_API_KEY`.
    pub fn from_env(prefix: &str) -> Self {
        let var = |suffix: &str| {
            std::env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .filter(|v| !v.is_empty())
        };
        Self {
            data_url: var("URL"),
            signature_url: var("SIGNATURE_URL"),
            trust_anchor: var("ANCHOR"),
            api_key: var("API_KEY"),
        }
    }

    /// Set the payload URL.
    pub fn with_data_url(mut self, url: impl Into<String>) -> Self {
        self.data_url = Some(url.into());
        self
    }

    /// Set the signature URL.
    pub fn with_signature_url(mut self, url: impl Into<String>) -> Self {
        self.signature_url = Some(url.into());
        self
    }

    /// Set the trust anchor.
    pub fn with_trust_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.trust_anchor = Some(anchor.into());
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Settings shared by all datasets of a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root directory for blobs, keys and settings.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Encrypt business rules and value sets too (the trust list always is).
    #[serde(default)]
    pub store_encrypted: bool,

    /// Whether the platform offers the modern key store.
    #[serde(default = "default_key_store_available")]
    pub key_store_available: bool,
}

fn default_storage_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("dcc-cache")
}

fn default_timeout() -> u64 {
    30
}

fn default_key_store_available() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            timeout_secs: default_timeout(),
            store_encrypted: false,
            key_store_available: default_key_store_available(),
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `DCC_CACHE_DIR` | Storage root |
    /// | `DCC_CACHE_TIMEOUT` | Request timeout in seconds |
    /// | `DCC_CACHE_ENCRYPT` | Encrypt all datasets at rest |
    pub fn from_env() -> Self {
        Self {
            storage_dir: std::env::var("DCC_CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_storage_dir),
            timeout_secs: std::env::var("DCC_CACHE_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            store_encrypted: std::env::var("DCC_CACHE_ENCRYPT")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            key_store_available: default_key_store_available(),
        }
    }

    /// Set the storage root.
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Encrypt all datasets.
    pub fn with_store_encrypted(mut self, encrypted: bool) -> Self {
        self.store_encrypted = encrypted;
        self
    }

    /// Pretend the modern key store is missing (legacy platforms).
    pub fn with_key_store_available(mut self, available: bool) -> Self {
        self.key_store_available = available;
        self
    }

    /// Directory holding encrypted and plaintext blobs.
    pub fn blob_dir(&self) -> PathBuf {
        self.storage_dir.join("blobs")
    }

    /// Directory holding local encryption keys.
    pub fn key_dir(&self) -> PathBuf {
        self.storage_dir.join("keys")
    }

    /// Directory standing in for legacy secure-item storage.
    pub fn legacy_dir(&self) -> PathBuf {
        self.storage_dir.join("legacy")
    }

    /// Path of the key-value settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.storage_dir.join("settings.json")
    }
}

//! The three signed datasets and the wiring they share.
//!
//! Each dataset is a [`SignedCache`] plus fixed storage identifiers, default
//! endpoints and a projection over its payload.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::DateService;
use crate::client::HttpFetcher;
use crate::engine::SignedCache;
use crate::error::{CacheError, CacheResult};
use crate::settings::{JsonFileSettings, SettingsStore};
use crate::snapshot::SignedData;
use crate::store::{
    EncryptedStore, EncryptionStrategy, FileKeyStore, FileSecureItemStore, SecureItemStore,
};
use crate::types::{CacheConfig, DatasetEndpoint, ServiceConfig, StorageIds};
use crate::verify::{DsseSignatureVerifier, SignatureVerifier};

mod business_rules;
mod trustlist;
mod value_sets;

pub use business_rules::{BusinessRule, BusinessRulesContainer, BusinessRulesService};
pub use trustlist::{CwtClaims, PublicKey, TrustEntry, TrustList, TrustlistService};
pub use value_sets::{ValueSet, ValueSetContainer, ValueSetsService};

/// How often each dataset's signature is checked.
pub const UPDATE_INTERVAL_HOURS: i64 = 24;

/// How long a dataset may be served without a successful check.
pub const MAXIMUM_AGE_HOURS: i64 = 72;

const DEFAULT_BASE_URL: &str = "https://dgc.a-sit.at/ehn";

/// Kind of health certificate a trust-list key may sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertType {
    Test,
    Vaccination,
    Recovery,
}

impl std::fmt::Display for CertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::Vaccination => write!(f, "vaccination"),
            Self::Recovery => write!(f, "recovery"),
        }
    }
}

/// Fixed identity of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    TrustList,
    BusinessRules,
    ValueSets,
}

impl Dataset {
    /// Blob, key and legacy names.
    pub fn storage_ids(self) -> StorageIds {
        let (blob, key, legacy) = match self {
            Self::TrustList => ("trustlist", "trustlist_key", "trustlist_keychain"),
            Self::BusinessRules => ("businessrules", "businessrules_key", "businessrules_keychain"),
            Self::ValueSets => ("valuesets", "valuesets_key", "valuesets_keychain"),
        };
        StorageIds {
            blob_name: blob.to_string(),
            key_alias: key.to_string(),
            legacy_alias: legacy.to_string(),
        }
    }

    /// Settings key of the last-update timestamp.
    pub fn last_update_key(self) -> &'static str {
        match self {
            Self::TrustList => "last_trustlist_update",
            Self::BusinessRules => "last_businessrules_update",
            Self::ValueSets => "last_valuesets_update",
        }
    }

    /// Prefix of the endpoint environment variables.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Self::TrustList => "DCC_TRUSTLIST",
            Self::BusinessRules => "DCC_BUSINESS_RULES",
            Self::ValueSets => "DCC_VALUE_SETS",
        }
    }

    pub fn default_data_url(self) -> String {
        match self {
            Self::TrustList => format!("{}/cert/listv2", DEFAULT_BASE_URL),
            Self::BusinessRules => format!("{}/rules/v1/bin", DEFAULT_BASE_URL),
            Self::ValueSets => format!("{}/values/v1/bin", DEFAULT_BASE_URL),
        }
    }

    pub fn default_signature_url(self) -> String {
        match self {
            Self::TrustList => format!("{}/cert/sigv2", DEFAULT_BASE_URL),
            Self::BusinessRules => format!("{}/rules/v1/sig", DEFAULT_BASE_URL),
            Self::ValueSets => format!("{}/values/v1/sig", DEFAULT_BASE_URL),
        }
    }

    /// The trust list is always encrypted; the others follow the caller.
    pub fn encrypts(self, store_encrypted: bool) -> bool {
        matches!(self, Self::TrustList) || store_encrypted
    }

    /// Resolve `endpoint` against the defaults into a cache configuration.
    pub fn cache_config(
        self,
        endpoint: &DatasetEndpoint,
        store_encrypted: bool,
    ) -> CacheResult<CacheConfig> {
        let trust_anchor = endpoint.trust_anchor.clone().ok_or_else(|| CacheError::Config {
            message: format!(
                "no trust anchor for {} (set {}_ANCHOR)",
                self.storage_ids().blob_name,
                self.env_prefix()
            ),
        })?;

        let config = CacheConfig {
            data_url: endpoint
                .data_url
                .clone()
                .unwrap_or_else(|| self.default_data_url()),
            signature_url: endpoint
                .signature_url
                .clone()
                .unwrap_or_else(|| self.default_signature_url()),
            trust_anchor,
            api_key: endpoint.api_key.clone(),
            update_interval: Duration::hours(UPDATE_INTERVAL_HOURS),
            maximum_age: Duration::hours(MAXIMUM_AGE_HOURS),
            storage: self.storage_ids(),
            last_update_key: self.last_update_key().to_string(),
            store_encrypted: self.encrypts(store_encrypted),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Collaborators shared by all datasets of one service.
#[derive(Debug, Clone)]
pub struct DatasetContext {
    service: ServiceConfig,
    settings: Arc<dyn SettingsStore>,
    legacy: Arc<dyn SecureItemStore>,
    /// Shared by every store built from this context, so key creation for an
    /// alias is serialized across hot-swapped services.
    keys: Option<FileKeyStore>,
    verifier: Arc<dyn SignatureVerifier>,
    clock: Arc<dyn DateService>,
}

impl DatasetContext {
    /// File-backed collaborators under `service.storage_dir`.
    pub fn new(service: ServiceConfig, clock: Arc<dyn DateService>) -> Self {
        let settings: Arc<dyn SettingsStore> =
            Arc::new(JsonFileSettings::new(service.settings_path()));
        let legacy: Arc<dyn SecureItemStore> =
            Arc::new(FileSecureItemStore::new(service.legacy_dir()));
        let keys = service
            .key_store_available
            .then(|| FileKeyStore::new(service.key_dir()));
        Self {
            service,
            settings,
            legacy,
            keys,
            verifier: Arc::new(DsseSignatureVerifier),
            clock,
        }
    }

    /// Replace the settings store.
    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the legacy secure-item store.
    pub fn with_legacy_store(mut self, legacy: Arc<dyn SecureItemStore>) -> Self {
        self.legacy = legacy;
        self
    }

    /// Replace the signature verifier.
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn service_config(&self) -> &ServiceConfig {
        &self.service
    }

    pub fn date_service(&self) -> Arc<dyn DateService> {
        self.clock.clone()
    }

    pub(crate) fn set_date_service(&mut self, clock: Arc<dyn DateService>) {
        self.clock = clock;
    }

    fn store(&self, store_encrypted: bool) -> EncryptedStore {
        let strategy =
            EncryptionStrategy::select(store_encrypted, self.keys.clone(), self.legacy.clone());
        EncryptedStore::new(self.service.blob_dir(), strategy, self.legacy.clone())
    }

    /// Build and open the cache for `dataset`.
    pub(crate) async fn open_cache<T: SignedData>(
        &self,
        dataset: Dataset,
        endpoint: &DatasetEndpoint,
        clock: Option<Arc<dyn DateService>>,
        on_update: impl Fn(&T) + Send + Sync + 'static,
    ) -> CacheResult<SignedCache<T>> {
        let config = dataset.cache_config(endpoint, self.service.store_encrypted)?;
        let fetcher = HttpFetcher::new(
            &config,
            StdDuration::from_secs(self.service.timeout_secs),
            self.verifier.clone(),
        )?;
        let store = self.store(config.store_encrypted);
        debug!(
            dataset = %config.storage.blob_name,
            url = %config.data_url,
            strategy = store.strategy().name(),
            authenticated = fetcher.is_authenticated(),
            "opening dataset"
        );

        Ok(
            SignedCache::builder(config, Arc::new(fetcher), store, self.settings.clone())
                .with_date_service(clock.unwrap_or_else(|| self.clock.clone()))
                .on_update(on_update)
                .open()
                .await,
        )
    }
}

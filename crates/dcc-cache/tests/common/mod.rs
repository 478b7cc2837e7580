//! Shared helpers: a mock publisher serving signed datasets.

#![allow(dead_code)]

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use dcc_cache::{
    encode_trust_anchor, sign_hash_statement, CacheConfig, DatasetEndpoint, DsseSignatureVerifier,
    EncryptedStore, EncryptionStrategy, FileKeyStore, HttpFetcher, ManualDateService,
    MemorySecureItemStore, MemorySettings, SecureItemStore, SignedCache, SignedData,
    SignedHashStatement, StorageIds,
};
use ed25519_dalek::SigningKey;
use serde::Serialize;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2021-08-26T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn generate_key() -> SigningKey {
    SigningKey::generate(&mut rand::thread_rng())
}

/// Mock server publishing `/{name}/sig` and `/{name}/bin`.
pub struct Publisher {
    pub server: MockServer,
    pub key: SigningKey,
}

impl Publisher {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            key: generate_key(),
        }
    }

    pub fn anchor(&self) -> String {
        encode_trust_anchor(&self.key.verifying_key()).unwrap()
    }

    pub fn endpoint(&self, name: &str) -> DatasetEndpoint {
        DatasetEndpoint::default()
            .with_data_url(format!("{}/{}/bin", self.server.uri(), name))
            .with_signature_url(format!("{}/{}/sig", self.server.uri(), name))
            .with_trust_anchor(self.anchor())
    }

    /// Signature body over `hash`, valid from an hour before `t0` for 30 days.
    pub fn signature(&self, hash: &[u8]) -> Vec<u8> {
        signature_by(&self.key, hash)
    }

    /// Serve `payload` (CBOR) with a signature over `hash`.
    pub async fn publish<T: Serialize>(&self, name: &str, payload: &T, hash: &[u8]) {
        let body = serde_cbor::to_vec(payload).unwrap();
        self.publish_raw(name, self.signature(hash), body).await;
    }

    pub async fn publish_raw(&self, name: &str, signature: Vec<u8>, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(format!("/{}/sig", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(signature))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{}/bin", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    /// Answer everything with `status`.
    pub async fn fail_with(&self, status: u16) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Drop mocks and recorded requests.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Requests received for `request_path` since the last reset.
    pub async fn hits(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}

pub fn signature_by(key: &SigningKey, hash: &[u8]) -> Vec<u8> {
    let statement = SignedHashStatement {
        content_hash: BASE64.encode(hash),
        issued_at: t0() - Duration::hours(1),
        expires_at: t0() + Duration::days(30),
    };
    sign_hash_statement(key, &statement).unwrap()
}

pub fn cache_config(endpoint: &DatasetEndpoint, name: &str) -> CacheConfig {
    CacheConfig {
        data_url: endpoint.data_url.clone().unwrap(),
        signature_url: endpoint.signature_url.clone().unwrap(),
        trust_anchor: endpoint.trust_anchor.clone().unwrap(),
        api_key: endpoint.api_key.clone(),
        update_interval: Duration::hours(24),
        maximum_age: Duration::hours(72),
        storage: StorageIds {
            blob_name: name.to_string(),
            key_alias: format!("{}_key", name),
            legacy_alias: format!("{}_keychain", name),
        },
        last_update_key: format!("last_{}_update", name),
        store_encrypted: true,
    }
}

/// Storage, settings and clock that outlive individual cache instances.
pub struct Device {
    pub dir: TempDir,
    pub settings: Arc<MemorySettings>,
    pub legacy: MemorySecureItemStore,
    pub clock: ManualDateService,
}

impl Device {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            settings: Arc::new(MemorySettings::new()),
            legacy: MemorySecureItemStore::new(),
            clock: ManualDateService::new(t0()),
        }
    }

    pub fn store(&self) -> EncryptedStore {
        let legacy: Arc<dyn SecureItemStore> = Arc::new(self.legacy.clone());
        let strategy = EncryptionStrategy::select(
            true,
            Some(FileKeyStore::new(self.dir.path().join("keys"))),
            legacy.clone(),
        );
        EncryptedStore::new(self.dir.path().join("blobs"), strategy, legacy)
    }

    /// Open a cache and wait for its initial background refresh.
    pub async fn open<T: SignedData>(&self, config: CacheConfig) -> SignedCache<T> {
        let cache = self.open_unsettled(config).await;
        cache.settled().await;
        cache
    }

    pub async fn open_unsettled<T: SignedData>(&self, config: CacheConfig) -> SignedCache<T> {
        let fetcher = HttpFetcher::new(
            &config,
            std::time::Duration::from_secs(5),
            Arc::new(DsseSignatureVerifier),
        )
        .unwrap();
        SignedCache::builder(config, Arc::new(fetcher), self.store(), self.settings.clone())
            .with_date_service(Arc::new(self.clock.clone()))
            .open()
            .await
    }
}

//! Signed, encrypted-at-rest caches for health certificate validation data.
//!
//! This crate keeps three remotely published datasets available offline:
//!
//! - the trust list of certificate signing keys
//! - business rules
//! - value sets
//!
//! Each dataset is a [`SignedCache`]: refreshed at most once per update
//! interval, re-downloaded only when its detached signature reports a new
//! content hash, persisted through an [`EncryptedStore`], and refused with
//! [`CacheError::DataExpired`] once it has not been confirmed for longer than
//! its maximum age.
//!
//! # Quick Start
//!
//! ```no_run
//! use dcc_cache::{CertType, DccCachingService};
//!
//! # async fn example() -> Result<(), dcc_cache::CacheError> {
//! let service = DccCachingService::from_env().await?;
//!
//! let key = service
//!     .trustlist_service()
//!     .key(b"\x25\xe3\x8b\xd0", CertType::Vaccination)
//!     .await?;
//! println!("signing key algorithm: {}", key.algorithm);
//!
//! let rules = service.business_rules_service().business_rules().await?;
//! println!("{} business rules", rules.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `DCC_CACHE_DIR` | Storage root (default: platform cache dir + `dcc-cache`) |
//! | `DCC_CACHE_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `DCC_CACHE_ENCRYPT` | Encrypt business rules and value sets too (`1`/`true`) |
//! | `DCC_TRUSTLIST_URL` / `_SIGNATURE_URL` | Trust-list endpoints |
//! | `DCC_TRUSTLIST_ANCHOR` | Trust anchor, Base64 SPKI (required) |
//! | `DCC_TRUSTLIST_API_KEY` | Sent as `X-Token` |
//! | `DCC_BUSINESS_RULES_*` | Same four variables for business rules |
//! | `DCC_VALUE_SETS_*` | Same four variables for value sets |

pub mod auth;
pub mod client;
pub mod clock;
pub mod datasets;
pub mod engine;
pub mod error;
pub mod facade;
pub mod policy;
pub mod settings;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod verify;

// Re-export main types
pub use auth::ApiKey;
pub use client::{HttpFetcher, RemoteFetcher};
pub use clock::{DateService, ManualDateService, SystemDateService};
pub use datasets::{
    BusinessRule, BusinessRulesContainer, BusinessRulesService, CertType, CwtClaims, Dataset,
    DatasetContext, PublicKey, TrustEntry, TrustList, TrustlistService, ValueSet,
    ValueSetContainer, ValueSetsService,
};
pub use engine::{SignedCache, SignedCacheBuilder, UpdateHook};
pub use error::{CacheError, CacheResult, TrustFailure};
pub use facade::{DccCachingService, Endpoints};
pub use settings::{JsonFileSettings, MemorySettings, SettingsStore};
pub use snapshot::{SignedData, Snapshot};
pub use store::{
    EncryptedStore, EncryptionStrategy, FileKeyStore, FileSecureItemStore, MemorySecureItemStore,
    SecureItemStore,
};
pub use types::{CacheConfig, DatasetEndpoint, ServiceConfig, StorageIds};
pub use verify::{
    encode_trust_anchor, sign_hash_statement, DsseSignatureVerifier, SignatureVerifier,
    SignedHashStatement,
};

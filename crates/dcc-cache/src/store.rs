//! Durable blob storage with a pluggable encryption strategy.
//!
//! # Layout
//!
//! ```text
//! {storage_dir}/
//!   blobs/{blob_name}      # snapshot (encrypted or plaintext)
//!   keys/{key_alias}.key   # local encryption keys
//!   legacy/{alias}.item    # legacy secure items
//!   settings.json          # last-update timestamps
//! ```
//!
//! Every failure on these paths is logged and reported as a miss (`load`) or
//! `false` (`save`); the in-memory snapshot stays authoritative.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{CacheError, CacheResult};
use crate::types::StorageIds;

mod crypto;
pub(crate) mod io;
mod keys;
mod legacy;

pub use keys::FileKeyStore;
pub use legacy::{FileSecureItemStore, MemorySecureItemStore, SecureItemStore};

/// How snapshots are protected at rest. Chosen once per store.
#[derive(Clone)]
pub enum EncryptionStrategy {
    /// Encrypt with a local key looked up by alias.
    Authenticated(FileKeyStore),

    /// Write the bytes as they are.
    Plaintext,

    /// Keep the blob in secure-item storage under the legacy alias.
    Legacy(Arc<dyn SecureItemStore>),
}

impl EncryptionStrategy {
    /// Select a strategy from the caller's wish and the platform's capability.
    ///
    /// `key_store` is `None` on platforms lacking the modern key store.
    pub fn select(
        store_encrypted: bool,
        key_store: Option<FileKeyStore>,
        legacy: Arc<dyn SecureItemStore>,
    ) -> Self {
        match (store_encrypted, key_store) {
            (false, _) => Self::Plaintext,
            (true, Some(keys)) => Self::Authenticated(keys),
            (true, None) => Self::Legacy(legacy),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::Plaintext => "plaintext",
            Self::Legacy(_) => "legacy",
        }
    }
}

impl fmt::Debug for EncryptionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionStrategy::{}", self.name())
    }
}

/// Blob store used by a signed cache.
#[derive(Debug, Clone)]
pub struct EncryptedStore {
    blob_dir: PathBuf,
    strategy: EncryptionStrategy,
    legacy: Arc<dyn SecureItemStore>,
}

impl EncryptedStore {
    /// Create a store writing blobs under `blob_dir`.
    ///
    /// `legacy` is consulted for migration and cleanup even when the
    /// strategy itself is not [`EncryptionStrategy::Legacy`].
    pub fn new(
        blob_dir: impl Into<PathBuf>,
        strategy: EncryptionStrategy,
        legacy: Arc<dyn SecureItemStore>,
    ) -> Self {
        Self {
            blob_dir: blob_dir.into(),
            strategy,
            legacy,
        }
    }

    pub fn strategy(&self) -> &EncryptionStrategy {
        &self.strategy
    }

    pub fn blob_dir(&self) -> &Path {
        &self.blob_dir
    }

    fn blob_path(&self, ids: &StorageIds) -> PathBuf {
        self.blob_dir.join(io::file_name_impl(&ids.blob_name))
    }

    /// Persist `bytes`. Returns `false` (after logging) on any failure.
    pub async fn save(&self, ids: &StorageIds, bytes: &[u8]) -> bool {
        match self.try_save(ids, bytes).await {
            Ok(()) => {
                debug!(name = %ids.blob_name, strategy = self.strategy.name(), "stored blob");
                true
            }
            Err(e) => {
                error!(name = %ids.blob_name, error = %e, "cannot write data to storage");
                false
            }
        }
    }

    async fn try_save(&self, ids: &StorageIds, bytes: &[u8]) -> CacheResult<()> {
        match &self.strategy {
            EncryptionStrategy::Authenticated(keys) => {
                let key = keys.get_or_create(&ids.key_alias).await?;
                let sealed = crypto::seal_impl(&key, ids.blob_name.as_bytes(), bytes)?;
                io::write_atomic_impl(&self.blob_path(ids), &sealed).await
            }
            EncryptionStrategy::Plaintext => {
                io::write_atomic_impl(&self.blob_path(ids), bytes).await
            }
            EncryptionStrategy::Legacy(items) => items.upsert(&ids.legacy_alias, bytes).await,
        }
    }

    /// Load the blob. Missing, unreadable and undecryptable blobs are all `None`.
    pub async fn load(&self, ids: &StorageIds) -> Option<Vec<u8>> {
        match self.try_load(ids).await {
            Ok(found) => found,
            Err(e) => {
                warn!(name = %ids.blob_name, error = %e, "cannot load cached data");
                None
            }
        }
    }

    async fn try_load(&self, ids: &StorageIds) -> CacheResult<Option<Vec<u8>>> {
        match &self.strategy {
            EncryptionStrategy::Authenticated(keys) => {
                let Some(sealed) = io::read_optional_impl(&self.blob_path(ids)).await? else {
                    return Ok(None);
                };
                let key = keys.get(&ids.key_alias).await?.ok_or_else(|| {
                    CacheError::storage(format!("no key for alias {}", ids.key_alias))
                })?;
                crypto::open_impl(&key, ids.blob_name.as_bytes(), &sealed).map(Some)
            }
            EncryptionStrategy::Plaintext => io::read_optional_impl(&self.blob_path(ids)).await,
            EncryptionStrategy::Legacy(items) => items.fetch(&ids.legacy_alias).await,
        }
    }

    /// Remove the blob (all strategies). Failures are logged.
    pub async fn remove(&self, ids: &StorageIds) {
        let result = match &self.strategy {
            EncryptionStrategy::Legacy(items) => items.delete(&ids.legacy_alias).await,
            _ => io::remove_if_exists_impl(&self.blob_path(ids)).await,
        };
        if let Err(e) = result {
            warn!(name = %ids.blob_name, error = %e, "cannot remove cached data");
        }
    }

    /// Move a leftover legacy item into the current strategy, then delete it.
    ///
    /// A no-op under [`EncryptionStrategy::Legacy`]. The item only replaces
    /// the primary blob when the primary is missing. Returns whether an item
    /// was migrated.
    pub async fn migrate_legacy(&self, ids: &StorageIds) -> bool {
        if matches!(self.strategy, EncryptionStrategy::Legacy(_)) {
            return false;
        }

        let item = match self.legacy.fetch(&ids.legacy_alias).await {
            Ok(Some(item)) => item,
            Ok(None) => return false,
            Err(e) => {
                warn!(alias = %ids.legacy_alias, error = %e, "cannot read legacy item");
                return false;
            }
        };

        let mut migrated = false;
        if self.load(ids).await.is_none() {
            migrated = self.save(ids, &item).await;
            if migrated {
                info!(name = %ids.blob_name, "migrated legacy item");
            }
        }

        match self.legacy.delete(&ids.legacy_alias).await {
            Ok(_) => debug!(alias = %ids.legacy_alias, "removed legacy item"),
            Err(e) => warn!(alias = %ids.legacy_alias, error = %e, "cannot remove legacy item"),
        }
        migrated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids() -> StorageIds {
        StorageIds {
            blob_name: "trustlist".to_string(),
            key_alias: "trustlist_key".to_string(),
            legacy_alias: "trustlist_keychain".to_string(),
        }
    }

    fn store_with(temp_dir: &TempDir, kind: &str) -> (EncryptedStore, MemorySecureItemStore) {
        let legacy = MemorySecureItemStore::new();
        let legacy_dyn: Arc<dyn SecureItemStore> = Arc::new(legacy.clone());
        let strategy = match kind {
            "authenticated" => EncryptionStrategy::select(
                true,
                Some(FileKeyStore::new(temp_dir.path().join("keys"))),
                legacy_dyn.clone(),
            ),
            "plaintext" => EncryptionStrategy::select(false, None, legacy_dyn.clone()),
            _ => EncryptionStrategy::select(true, None, legacy_dyn.clone()),
        };
        assert_eq!(strategy.name(), kind);
        (
            EncryptedStore::new(temp_dir.path().join("blobs"), strategy, legacy_dyn),
            legacy,
        )
    }

    #[tokio::test]
    async fn test_roundtrip_every_strategy() {
        for kind in ["authenticated", "plaintext", "legacy"] {
            let temp_dir = TempDir::new().unwrap();
            let (store, _) = store_with(&temp_dir, kind);

            assert!(store.load(&ids()).await.is_none(), "{}", kind);
            assert!(store.save(&ids(), b"snapshot bytes").await, "{}", kind);
            assert_eq!(
                store.load(&ids()).await,
                Some(b"snapshot bytes".to_vec()),
                "{}",
                kind
            );
        }
    }

    #[tokio::test]
    async fn test_authenticated_blob_is_not_plaintext() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _) = store_with(&temp_dir, "authenticated");
        store.save(&ids(), b"snapshot bytes").await;

        let on_disk = std::fs::read(temp_dir.path().join("blobs").join("trustlist")).unwrap();
        assert!(!on_disk
            .windows(b"snapshot".len())
            .any(|w| w == b"snapshot"));
    }

    #[tokio::test]
    async fn test_corrupted_blob_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _) = store_with(&temp_dir, "authenticated");
        store.save(&ids(), b"snapshot bytes").await;

        let path = temp_dir.path().join("blobs").join("trustlist");
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        assert!(store.load(&ids()).await.is_none());
    }

    #[tokio::test]
    async fn test_lost_key_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _) = store_with(&temp_dir, "authenticated");
        store.save(&ids(), b"snapshot bytes").await;

        std::fs::remove_dir_all(temp_dir.path().join("keys")).unwrap();
        assert!(store.load(&ids()).await.is_none());
    }

    #[tokio::test]
    async fn test_save_failure_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        // A file where the blob directory should be.
        let blocker = temp_dir.path().join("blobs");
        std::fs::write(&blocker, b"not a dir").unwrap();
        let legacy: Arc<dyn SecureItemStore> = Arc::new(MemorySecureItemStore::new());
        let store = EncryptedStore::new(&blocker, EncryptionStrategy::Plaintext, legacy);

        assert!(!store.save(&ids(), b"x").await);
    }

    #[tokio::test]
    async fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _) = store_with(&temp_dir, "plaintext");
        store.save(&ids(), b"x").await;
        store.remove(&ids()).await;
        assert!(store.load(&ids()).await.is_none());
    }

    #[tokio::test]
    async fn test_migrate_legacy_into_empty_primary() {
        let temp_dir = TempDir::new().unwrap();
        let (store, legacy) = store_with(&temp_dir, "authenticated");
        legacy.upsert("trustlist_keychain", b"old").await.unwrap();

        assert!(store.migrate_legacy(&ids()).await);
        assert_eq!(store.load(&ids()).await, Some(b"old".to_vec()));
        assert!(!legacy.contains("trustlist_keychain"));
    }

    #[tokio::test]
    async fn test_migrate_legacy_keeps_existing_primary() {
        let temp_dir = TempDir::new().unwrap();
        let (store, legacy) = store_with(&temp_dir, "plaintext");
        store.save(&ids(), b"current").await;
        legacy.upsert("trustlist_keychain", b"old").await.unwrap();

        assert!(!store.migrate_legacy(&ids()).await);
        assert_eq!(store.load(&ids()).await, Some(b"current".to_vec()));
        assert!(!legacy.contains("trustlist_keychain"));
    }

    #[tokio::test]
    async fn test_legacy_strategy_keeps_its_items() {
        let temp_dir = TempDir::new().unwrap();
        let (store, legacy) = store_with(&temp_dir, "legacy");
        store.save(&ids(), b"current").await;

        assert!(!store.migrate_legacy(&ids()).await);
        assert!(legacy.contains("trustlist_keychain"));
    }
}

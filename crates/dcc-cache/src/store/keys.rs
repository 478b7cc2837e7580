//! Local encryption keys, one per alias.
//!
//! Keys are generated on first use and never leave the key directory
//! (owner-only permissions, no accessor returning key bytes outside the
//! crate).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::CacheResult;

use super::crypto::{generate_key_impl, KEY_LEN};
use super::io;

/// File-backed key store.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
    create_lock: Arc<Mutex<()>>,
}

impl FileKeyStore {
    /// Create a key store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            create_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Key directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{}.key", io::file_name_impl(alias)))
    }

    /// Existing key for `alias`. A malformed key file counts as missing.
    pub(crate) async fn get(&self, alias: &str) -> CacheResult<Option<[u8; KEY_LEN]>> {
        let Some(bytes) = io::read_optional_impl(&self.key_path(alias)).await? else {
            return Ok(None);
        };
        match <[u8; KEY_LEN]>::try_from(bytes.as_slice()) {
            Ok(key) => Ok(Some(key)),
            Err(_) => {
                warn!(alias, len = bytes.len(), "ignoring malformed key file");
                Ok(None)
            }
        }
    }

    /// Key for `alias`, generated and stored if it does not exist yet.
    pub(crate) async fn get_or_create(&self, alias: &str) -> CacheResult<[u8; KEY_LEN]> {
        let _guard = self.create_lock.lock().await;
        if let Some(key) = self.get(alias).await? {
            return Ok(key);
        }

        let key = generate_key_impl();
        io::write_atomic_impl(&self.key_path(alias), &key).await?;
        debug!(alias, "generated local encryption key");
        Ok(key)
    }

    /// Delete the key for `alias`.
    pub async fn delete(&self, alias: &str) -> CacheResult<bool> {
        io::remove_if_exists_impl(&self.key_path(alias)).await
    }
}

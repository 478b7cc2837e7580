//! Legacy secure-item storage.
//!
//! Platforms without the modern key store keep snapshots as labelled
//! secure items instead of encrypted files. Items are upserted: an existing
//! label is updated in place, a missing one is added.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::CacheResult;

use super::io;

/// Generic labelled secret storage.
#[async_trait]
pub trait SecureItemStore: Send + Sync + fmt::Debug {
    /// Insert or update the item under `label`.
    async fn upsert(&self, label: &str, data: &[u8]) -> CacheResult<()>;

    /// Item under `label`, if any.
    async fn fetch(&self, label: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Delete the item under `label`; returns whether one existed.
    async fn delete(&self, label: &str) -> CacheResult<bool>;
}

/// Secure items as owner-only files in one directory.
#[derive(Debug, Clone)]
pub struct FileSecureItemStore {
    dir: PathBuf,
}

impl FileSecureItemStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn item_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{}.item", io::file_name_impl(label)))
    }
}

#[async_trait]
impl SecureItemStore for FileSecureItemStore {
    async fn upsert(&self, label: &str, data: &[u8]) -> CacheResult<()> {
        io::write_atomic_impl(&self.item_path(label), data).await
    }

    async fn fetch(&self, label: &str) -> CacheResult<Option<Vec<u8>>> {
        io::read_optional_impl(&self.item_path(label)).await
    }

    async fn delete(&self, label: &str) -> CacheResult<bool> {
        io::remove_if_exists_impl(&self.item_path(label)).await
    }
}

/// In-memory secure items (tests, ephemeral processes).
#[derive(Debug, Clone, Default)]
pub struct MemorySecureItemStore {
    items: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemorySecureItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether an item exists under `label`.
    pub fn contains(&self, label: &str) -> bool {
        self.items().contains_key(label)
    }
}

#[async_trait]
impl SecureItemStore for MemorySecureItemStore {
    async fn upsert(&self, label: &str, data: &[u8]) -> CacheResult<()> {
        self.items().insert(label.to_string(), data.to_vec());
        Ok(())
    }

    async fn fetch(&self, label: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.items().get(label).cloned())
    }

    async fn delete(&self, label: &str) -> CacheResult<bool> {
        Ok(self.items().remove(label).is_some())
    }
}

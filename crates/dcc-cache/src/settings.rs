//! Key-value settings storage for scalar state (last-update timestamps).
//!
//! Timestamps are stored as ISO-8601 text with second precision.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::error::{CacheError, CacheResult};
use crate::store::io;

/// Simple string settings.
#[async_trait]
pub trait SettingsStore: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    async fn remove(&self, key: &str) -> CacheResult<()>;
}

/// Read a timestamp; missing or unparsable values are `None`.
pub async fn load_timestamp(settings: &dyn SettingsStore, key: &str) -> Option<DateTime<Utc>> {
    let raw = match settings.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "cannot read setting");
            return None;
        }
    };
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(date) => Some(date.with_timezone(&Utc)),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring malformed timestamp");
            None
        }
    }
}

/// Write a timestamp as ISO-8601.
pub async fn store_timestamp(
    settings: &dyn SettingsStore,
    key: &str,
    value: DateTime<Utc>,
) -> CacheResult<()> {
    settings
        .set(key, &value.to_rfc3339_opts(SecondsFormat::Secs, true))
        .await
}

/// Settings in one JSON object file, rewritten atomically on change.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process.
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> CacheResult<BTreeMap<String, String>> {
        match io::read_optional_impl(&self.path).await? {
            None => Ok(BTreeMap::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                CacheError::storage(format!("failed to parse settings: {}", e))
            }),
        }
    }

    async fn write_all(&self, values: &BTreeMap<String, String>) -> CacheResult<()> {
        let json = serde_json::to_vec_pretty(values)
            .map_err(|e| CacheError::storage(format!("failed to serialize settings: {}", e)))?;
        io::write_atomic_impl(&self.path, &json).await
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettings {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let _guard = self.lock.lock().await;
        // A corrupt file is replaced rather than blocking every future write.
        let mut values = self.read_all().await.unwrap_or_else(|e| {
            warn!(error = %e, "discarding unreadable settings file");
            BTreeMap::new()
        });
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values).await
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_all().await?;
        if values.remove(key).is_some() {
            self.write_all(&values).await?;
        }
        Ok(())
    }
}

/// In-memory settings (tests, ephemeral processes).
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.values().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2021-08-26T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_timestamp_iso8601() {
        let settings = MemorySettings::new();
        store_timestamp(&settings, "last_trustlist_update", t0())
            .await
            .unwrap();

        assert_eq!(
            settings.get("last_trustlist_update").await.unwrap(),
            Some("2021-08-26T12:00:00Z".to_string())
        );
        assert_eq!(
            load_timestamp(&settings, "last_trustlist_update").await,
            Some(t0())
        );
    }

    #[tokio::test]
    async fn test_malformed_timestamp_is_none() {
        let settings = MemorySettings::new();
        settings.set("k", "yesterday").await.unwrap();
        assert_eq!(load_timestamp(&settings, "k").await, None);
        assert_eq!(load_timestamp(&settings, "missing").await, None);
    }

    #[tokio::test]
    async fn test_json_file_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        let first = JsonFileSettings::new(&path);
        first.set("a", "1").await.unwrap();
        first.set("b", "2").await.unwrap();
        first.remove("a").await.unwrap();

        let second = JsonFileSettings::new(&path);
        assert_eq!(second.get("a").await.unwrap(), None);
        assert_eq!(second.get("b").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_json_file_recovers_from_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, b"{not json").unwrap();

        let settings = JsonFileSettings::new(&path);
        assert!(settings.get("a").await.is_err());
        settings.set("a", "1").await.unwrap();
        assert_eq!(settings.get("a").await.unwrap(), Some("1".to_string()));
    }
}

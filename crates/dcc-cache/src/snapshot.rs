//! Cached payload together with the content hash it was verified against.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// A dataset that can be cached by a [`SignedCache`](crate::SignedCache).
///
/// The default value is the empty dataset served before anything has been
/// fetched or loaded.
pub trait SignedData:
    Default + Serialize + DeserializeOwned + Clone + Send + Sync + fmt::Debug + 'static
{
    /// Whether nothing usable is cached.
    fn is_empty(&self) -> bool;

    /// Decode a payload as served by the data endpoint (CBOR).
    fn decode(bytes: &[u8]) -> CacheResult<Self> {
        serde_cbor::from_slice(bytes).map_err(|e| CacheError::Decode {
            message: e.to_string(),
        })
    }
}

/// Payload, hash and last successful check.
///
/// Payload and hash are only ever replaced together. `last_update` is not part
/// of the persisted form; it lives in the settings store. `persisted` tells
/// whether this exact snapshot is known to be on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub payload: T,

    /// Content hash reported by the verified signature (Base64 on disk).
    #[serde(with = "base64_bytes", default)]
    pub hash: Vec<u8>,

    #[serde(skip, default = "epoch")]
    pub last_update: DateTime<Utc>,

    #[serde(skip)]
    pub persisted: bool,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl<T: SignedData> Default for Snapshot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: SignedData> Snapshot<T> {
    /// Empty payload, no hash, last update at the Unix epoch.
    pub fn empty() -> Self {
        Self {
            payload: T::default(),
            hash: Vec::new(),
            last_update: epoch(),
            persisted: false,
        }
    }

    pub fn has_data(&self) -> bool {
        !self.payload.is_empty()
    }

    /// Persisted representation (JSON).
    pub fn to_bytes(&self) -> CacheResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| CacheError::storage(format!("failed to encode snapshot: {}", e)))
    }

    /// Parse the persisted representation; `last_update` starts at the epoch.
    pub fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        let mut snapshot: Self = serde_json::from_slice(bytes)
            .map_err(|e| CacheError::storage(format!("failed to decode snapshot: {}", e)))?;
        snapshot.persisted = true;
        Ok(snapshot)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

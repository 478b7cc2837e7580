//! Wire-format parsing for detached signatures.
//!
//! Parsing and shape checks only; no key trust decisions.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult, TrustFailure};

/// DSSE envelope structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsseEnvelope {
    /// Payload type (e.g., "application/vnd.dcc.signed-hash+json;v=1").
    #[serde(rename = "payloadType")]
    pub payload_type: String,

    /// Base64-encoded payload.
    pub payload: String,

    /// Signatures.
    pub signatures: Vec<DsseSignature>,
}

/// DSSE signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsseSignature {
    /// Key ID.
    #[serde(rename = "keyid")]
    pub key_id: String,

    /// Base64-encoded signature.
    #[serde(rename = "sig")]
    pub signature: String,
}

/// Signed statement about the current payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedHashStatement {
    /// Base64 content hash of the current payload.
    pub content_hash: String,

    /// When the statement was issued.
    pub issued_at: DateTime<Utc>,

    /// When the statement stops being valid.
    pub expires_at: DateTime<Utc>,
}

pub(crate) fn malformed(message: impl Into<String>) -> CacheError {
    CacheError::trust_service(TrustFailure::Malformed, message)
}

pub(crate) fn parse_envelope_impl(body: &[u8]) -> CacheResult<DsseEnvelope> {
    serde_json::from_slice(body).map_err(|e| malformed(format!("invalid DSSE envelope: {}", e)))
}

pub(crate) fn decode_payload_impl(envelope: &DsseEnvelope) -> CacheResult<Vec<u8>> {
    BASE64
        .decode(&envelope.payload)
        .map_err(|e| malformed(format!("invalid base64 payload: {}", e)))
}

pub(crate) fn parse_statement_impl(payload: &[u8]) -> CacheResult<SignedHashStatement> {
    serde_json::from_slice(payload)
        .map_err(|e| malformed(format!("invalid signed statement: {}", e)))
}

pub(crate) fn decode_content_hash_impl(statement: &SignedHashStatement) -> CacheResult<Vec<u8>> {
    let hash = BASE64
        .decode(&statement.content_hash)
        .map_err(|e| malformed(format!("invalid base64 content hash: {}", e)))?;
    if hash.is_empty() {
        return Err(malformed("empty content hash"));
    }
    Ok(hash)
}

//! Detached signature verification.
//!
//! The signature endpoint serves a DSSE envelope whose payload is a
//! [`SignedHashStatement`]: the content hash of the current payload plus an
//! issuance window. Verification checks, in order:
//!
//! 1. Envelope shape and payload type
//! 2. Ed25519 signature over PAE by the configured trust anchor
//! 3. Statement validity window against the injected clock
//!
//! and yields the content hash. The cache compares hashes only; it never
//! looks inside the payload to decide whether data changed.

use std::fmt;

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;

use crate::error::{CacheError, CacheResult, TrustFailure};

mod anchor;
mod dsse;
mod wire;

pub use anchor::{compute_key_id, compute_key_id_from_key, encode_trust_anchor};
pub use wire::{DsseEnvelope, DsseSignature, SignedHashStatement};

/// Payload type of signed hash statements.
pub const PAYLOAD_TYPE_SIGNED_HASH_V1: &str = "application/vnd.dcc.signed-hash+json;v=1";

/// Contract the cache needs from signature verification.
pub trait SignatureVerifier: Send + Sync + fmt::Debug {
    /// Verify `body` against `trust_anchor` at `now` and return the content hash.
    fn verify(&self, body: &[u8], trust_anchor: &str, now: DateTime<Utc>) -> CacheResult<Vec<u8>>;
}

/// DSSE + Ed25519 verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct DsseSignatureVerifier;

impl SignatureVerifier for DsseSignatureVerifier {
    fn verify(&self, body: &[u8], trust_anchor: &str, now: DateTime<Utc>) -> CacheResult<Vec<u8>> {
        let envelope = wire::parse_envelope_impl(body)?;
        if envelope.payload_type != PAYLOAD_TYPE_SIGNED_HASH_V1 {
            return Err(wire::malformed(format!(
                "payload type mismatch: expected {}, got {}",
                PAYLOAD_TYPE_SIGNED_HASH_V1, envelope.payload_type
            )));
        }

        let anchor = anchor::decode_anchor_impl(trust_anchor)?;
        let payload = wire::decode_payload_impl(&envelope)?;
        dsse::verify_envelope_impl(&envelope, &payload, &anchor)?;

        let statement = wire::parse_statement_impl(&payload)?;
        if now < statement.issued_at {
            return Err(CacheError::trust_service(
                TrustFailure::SignatureNotYetValid,
                format!("signature issued at {}", statement.issued_at),
            ));
        }
        if now >= statement.expires_at {
            return Err(CacheError::trust_service(
                TrustFailure::SignatureExpired,
                format!("signature expired at {}", statement.expires_at),
            ));
        }

        wire::decode_content_hash_impl(&statement)
    }
}

/// Produce the signature endpoint body for `statement`.
///
/// Used by publishers and by test servers.
pub fn sign_hash_statement(
    signing_key: &SigningKey,
    statement: &SignedHashStatement,
) -> CacheResult<Vec<u8>> {
    let key_id = compute_key_id_from_key(&signing_key.verifying_key())?;
    let payload = serde_json::to_vec(statement).map_err(|e| CacheError::Config {
        message: format!("failed to serialize statement: {}", e),
    })?;
    let envelope = dsse::sign_impl(signing_key, key_id, PAYLOAD_TYPE_SIGNED_HASH_V1, &payload);
    serde_json::to_vec(&envelope).map_err(|e| CacheError::Config {
        message: format!("failed to serialize envelope: {}", e),
    })
}

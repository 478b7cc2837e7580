//! Trust anchor decoding and key ids.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};

use crate::error::{CacheError, CacheResult, TrustFailure};

/// Decoded trust anchor.
#[derive(Debug, Clone)]
pub(crate) struct Anchor {
    pub key: VerifyingKey,
    pub key_id: String,
}

/// Decode a Base64 SPKI public key (whitespace tolerated, as in PEM bodies).
pub(crate) fn decode_anchor_impl(b64: &str) -> CacheResult<Anchor> {
    use pkcs8::DecodePublicKey;

    let normalized: String = b64.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(&normalized).map_err(|e| {
        CacheError::trust_service(
            TrustFailure::UntrustedSigner,
            format!("invalid base64 trust anchor: {}", e),
        )
    })?;

    let key = VerifyingKey::from_public_key_der(&bytes).map_err(|e| {
        CacheError::trust_service(
            TrustFailure::UntrustedSigner,
            format!("invalid SPKI trust anchor: {}", e),
        )
    })?;

    Ok(Anchor {
        key,
        key_id: compute_key_id(&bytes),
    })
}

/// Key id of SPKI DER bytes: `sha256:<hex>`.
pub fn compute_key_id(spki_bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(spki_bytes)))
}

/// Base64 SPKI form of a key, as expected in trust anchor configuration.
pub fn encode_trust_anchor(key: &VerifyingKey) -> CacheResult<String> {
    use pkcs8::EncodePublicKey;

    let doc = key.to_public_key_der().map_err(|e| CacheError::Config {
        message: format!("failed to encode public key: {}", e),
    })?;
    Ok(BASE64.encode(doc.as_bytes()))
}

/// Key id of a verifying key.
pub fn compute_key_id_from_key(key: &VerifyingKey) -> CacheResult<String> {
    use pkcs8::EncodePublicKey;

    let doc = key.to_public_key_der().map_err(|e| CacheError::Config {
        message: format!("failed to encode public key: {}", e),
    })?;
    Ok(compute_key_id(doc.as_bytes()))
}

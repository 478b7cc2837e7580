//! DSSE signature verification over PAE.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};

use crate::error::{CacheError, CacheResult, TrustFailure};

use super::anchor::Anchor;
use super::wire::{malformed, DsseEnvelope, DsseSignature};

/// Build DSSE Pre-Authentication Encoding (PAE).
///
/// ```text
/// PAE(type, payload) = "DSSEv1" SP LEN(type) SP type SP LEN(payload) SP payload
/// ```
pub(crate) fn build_pae_impl(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let type_len = payload_type.len().to_string();
    let payload_len = payload.len().to_string();

    let mut pae = Vec::new();
    pae.extend_from_slice(b"DSSEv1 ");
    pae.extend_from_slice(type_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_type.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload);
    pae
}

fn untrusted(message: impl Into<String>) -> CacheError {
    CacheError::trust_service(TrustFailure::UntrustedSigner, message)
}

/// Verify that at least one signature in `envelope` was made by `anchor`.
///
/// Signatures under other key ids are ignored.
pub(crate) fn verify_envelope_impl(
    envelope: &DsseEnvelope,
    payload: &[u8],
    anchor: &Anchor,
) -> CacheResult<()> {
    if envelope.signatures.is_empty() {
        return Err(malformed("no signatures in envelope"));
    }

    let pae = build_pae_impl(&envelope.payload_type, payload);
    let mut last_error = None;
    for sig in envelope
        .signatures
        .iter()
        .filter(|s| s.key_id == anchor.key_id)
    {
        match verify_single_signature_impl(&pae, &sig.signature, anchor) {
            Ok(()) => return Ok(()),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        untrusted(format!("no signature by trust anchor {}", anchor.key_id))
    }))
}

fn verify_single_signature_impl(
    pae: &[u8],
    signature_b64: &str,
    anchor: &Anchor,
) -> CacheResult<()> {
    let signature_bytes = BASE64
        .decode(signature_b64)
        .map_err(|e| malformed(format!("invalid base64 signature: {}", e)))?;

    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|e| malformed(format!("invalid signature bytes: {}", e)))?;

    anchor
        .key
        .verify(pae, &signature)
        .map_err(|_| untrusted("ed25519 verification failed"))
}

pub(crate) fn sign_impl(
    signing_key: &SigningKey,
    key_id: String,
    payload_type: &str,
    payload: &[u8],
) -> DsseEnvelope {
    let pae = build_pae_impl(payload_type, payload);
    let signature = signing_key.sign(&pae);
    DsseEnvelope {
        payload_type: payload_type.to_string(),
        payload: BASE64.encode(payload),
        signatures: vec![DsseSignature {
            key_id,
            signature: BASE64.encode(signature.to_bytes()),
        }],
    }
}

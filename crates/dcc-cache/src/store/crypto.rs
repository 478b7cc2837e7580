//! Authenticated encryption of blobs (XChaCha20-Poly1305).
//!
//! Blob layout: `nonce (24 bytes) || ciphertext+tag`. The blob name is bound
//! as associated data, so a blob copied under another name fails to open.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

use crate::error::{CacheError, CacheResult};

const NONCE_LEN: usize = 24;

/// Length of a local encryption key.
pub(crate) const KEY_LEN: usize = 32;

pub(crate) fn generate_key_impl() -> [u8; KEY_LEN] {
    let generated = XChaCha20Poly1305::generate_key(&mut OsRng);
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&generated);
    key
}

pub(crate) fn seal_impl(key: &[u8; KEY_LEN], aad: &[u8], plaintext: &[u8]) -> CacheResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CacheError::storage("encryption failed"))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

pub(crate) fn open_impl(key: &[u8; KEY_LEN], aad: &[u8], blob: &[u8]) -> CacheResult<Vec<u8>> {
    if blob.len() < NONCE_LEN {
        return Err(CacheError::storage("encrypted blob too short"));
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CacheError::storage("decryption failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = generate_key_impl();
        let blob = seal_impl(&key, b"trustlist", b"payload").unwrap();
        assert_ne!(&blob[NONCE_LEN..], b"payload");
        assert_eq!(open_impl(&key, b"trustlist", &blob).unwrap(), b"payload");
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = seal_impl(&generate_key_impl(), b"trustlist", b"payload").unwrap();
        assert!(open_impl(&generate_key_impl(), b"trustlist", &blob).is_err());
    }

    #[test]
    fn test_wrong_name_fails() {
        let key = generate_key_impl();
        let blob = seal_impl(&key, b"trustlist", b"payload").unwrap();
        assert!(open_impl(&key, b"valuesets", &blob).is_err());
    }

    #[test]
    fn test_truncated_blob_fails() {
        let key = generate_key_impl();
        assert!(open_impl(&key, b"trustlist", &[0u8; 10]).is_err());
    }
}

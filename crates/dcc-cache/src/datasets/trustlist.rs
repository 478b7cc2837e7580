//! Trust list of certificate signing keys.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use pkcs8::spki::SubjectPublicKeyInfoRef;
use serde::{Deserialize, Serialize};

use crate::clock::DateService;
use crate::engine::SignedCache;
use crate::error::{CacheError, CacheResult};
use crate::snapshot::SignedData;
use crate::types::DatasetEndpoint;

use super::{CertType, Dataset, DatasetContext};

/// Signing keys allowed to issue certificates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustList {
    #[serde(default)]
    pub entries: Vec<TrustEntry>,
}

impl SignedData for TrustList {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TrustList {
    /// Entry for a raw key id.
    pub fn entry(&self, key_id: &[u8]) -> Option<&TrustEntry> {
        let encoded = BASE64.encode(key_id);
        self.entries.iter().find(|e| e.kid == encoded)
    }
}

/// One trusted key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustEntry {
    /// Base64 key id as found in certificate headers.
    pub kid: String,

    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,

    #[serde(default)]
    pub not_after: Option<DateTime<Utc>>,

    /// Certificate kinds this key may sign. Empty means all.
    #[serde(default)]
    pub usage: Vec<CertType>,

    /// Base64 SubjectPublicKeyInfo (DER).
    #[serde(default)]
    pub public_key: Option<String>,
}

impl TrustEntry {
    /// Whether `now` lies inside the entry's validity window.
    fn check_validity(&self, now: DateTime<Utc>) -> CacheResult<()> {
        if self.not_after.is_some_and(|t| now > t) {
            return Err(CacheError::KeyExpired {
                key_id: self.kid.clone(),
            });
        }
        if self.not_before.is_some_and(|t| now < t) {
            return Err(CacheError::KeyNotYetValid {
                key_id: self.kid.clone(),
            });
        }
        Ok(())
    }

    pub fn is_suitable_for(&self, cert_type: CertType) -> bool {
        self.usage.is_empty() || self.usage.contains(&cert_type)
    }

    fn public_key(&self) -> CacheResult<PublicKey> {
        let creation = |reason: String| CacheError::KeyCreation {
            key_id: self.kid.clone(),
            reason,
        };
        let encoded = self
            .public_key
            .as_deref()
            .ok_or_else(|| creation("no public key".to_string()))?;
        let spki = BASE64
            .decode(encoded)
            .map_err(|e| creation(format!("invalid base64: {}", e)))?;
        let algorithm = SubjectPublicKeyInfoRef::try_from(spki.as_slice())
            .map_err(|e| creation(format!("invalid SubjectPublicKeyInfo: {}", e)))?
            .algorithm
            .oid
            .to_string();

        Ok(PublicKey {
            kid: self.kid.clone(),
            algorithm,
            spki,
        })
    }
}

/// Public key handed to signature validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub kid: String,

    /// Algorithm OID from the SPKI.
    pub algorithm: String,

    /// SubjectPublicKeyInfo DER bytes.
    pub spki: Vec<u8>,
}

/// Issued-at and expiry of the certificate being validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CwtClaims {
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Checks in lookup order, after the expiry check done by the cache.
fn lookup(
    list: &TrustList,
    key_id: &[u8],
    cert_type: CertType,
    cwt: Option<&CwtClaims>,
    now: DateTime<Utc>,
) -> CacheResult<PublicKey> {
    let entry = list.entry(key_id).ok_or_else(|| CacheError::KeyNotFound {
        key_id: BASE64.encode(key_id),
    })?;
    entry.check_validity(now)?;
    if !entry.is_suitable_for(cert_type) {
        return Err(CacheError::KeySuitability {
            key_id: entry.kid.clone(),
            cert_type: cert_type.to_string(),
        });
    }

    if let (Some(cwt), Some(not_before), Some(not_after)) = (cwt, entry.not_before, entry.not_after)
    {
        if let (Some(issued_at), Some(expires_at)) = (cwt.issued_at, cwt.expires_at) {
            if not_after <= now {
                return Err(CacheError::KeyExpired {
                    key_id: entry.kid.clone(),
                });
            }
            if not_before >= now {
                return Err(CacheError::KeyNotYetValid {
                    key_id: entry.kid.clone(),
                });
            }
            if expires_at <= now {
                return Err(CacheError::CwtExpired);
            }
            if issued_at >= now {
                return Err(CacheError::CwtNotYetValid);
            }
        }
    }

    entry.public_key()
}

/// Trust-list service.
#[derive(Debug, Clone)]
pub struct TrustlistService {
    cache: SignedCache<TrustList>,
}

impl TrustlistService {
    pub async fn open(
        context: &DatasetContext,
        endpoint: &DatasetEndpoint,
        clock: Option<Arc<dyn DateService>>,
    ) -> CacheResult<Self> {
        let cache = context
            .open_cache(Dataset::TrustList, endpoint, clock, |_: &TrustList| {})
            .await?;
        Ok(Self { cache })
    }

    pub fn cache(&self) -> &SignedCache<TrustList> {
        &self.cache
    }

    /// Key `key_id` for a certificate of `cert_type`.
    pub async fn key(&self, key_id: &[u8], cert_type: CertType) -> CacheResult<PublicKey> {
        self.lookup(key_id, cert_type, None).await
    }

    /// Like [`key`](Self::key), also checking the key and token validity
    /// windows against each other.
    pub async fn key_for_cwt(
        &self,
        key_id: &[u8],
        cwt: &CwtClaims,
        cert_type: CertType,
    ) -> CacheResult<PublicKey> {
        self.lookup(key_id, cert_type, Some(cwt)).await
    }

    async fn lookup(
        &self,
        key_id: &[u8],
        cert_type: CertType,
        cwt: Option<&CwtClaims>,
    ) -> CacheResult<PublicKey> {
        let clock = self.cache.date_service();
        self.cache
            .read_with(|list| lookup(list, key_id, cert_type, cwt, clock.now()))
            .await?
    }

    /// Force a trust-list refresh.
    pub async fn update_trustlist_if_necessary(&self) -> CacheResult<()> {
        self.cache.force_refresh().await
    }

    pub async fn update_data_if_necessary(&self, force: bool) -> CacheResult<()> {
        self.cache.refresh(force).await
    }

    pub fn update_date_service(&self, clock: Arc<dyn DateService>) {
        self.cache.update_date_service(clock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ed25519_dalek::SigningKey;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2021-08-26T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn spki_b64() -> String {
        let key = SigningKey::generate(&mut rand::thread_rng());
        crate::verify::encode_trust_anchor(&key.verifying_key()).unwrap()
    }

    fn entry(kid: &[u8]) -> TrustEntry {
        TrustEntry {
            kid: BASE64.encode(kid),
            not_before: Some(now() - Duration::days(30)),
            not_after: Some(now() + Duration::days(30)),
            usage: vec![],
            public_key: Some(spki_b64()),
        }
    }

    fn list(entries: Vec<TrustEntry>) -> TrustList {
        TrustList { entries }
    }

    #[test]
    fn test_lookup_success() {
        let key = lookup(&list(vec![entry(b"k1")]), b"k1", CertType::Test, None, now()).unwrap();
        assert_eq!(key.kid, BASE64.encode(b"k1"));
        // id-Ed25519
        assert_eq!(key.algorithm, "1.3.101.112");
    }

    #[test]
    fn test_lookup_not_found() {
        let err = lookup(&list(vec![entry(b"k1")]), b"k2", CertType::Test, None, now()).unwrap_err();
        assert!(matches!(err, CacheError::KeyNotFound { .. }));
    }

    #[test]
    fn test_lookup_validity_window() {
        let mut expired = entry(b"k1");
        expired.not_after = Some(now() - Duration::days(1));
        let err = lookup(&list(vec![expired]), b"k1", CertType::Test, None, now()).unwrap_err();
        assert!(matches!(err, CacheError::KeyExpired { .. }));

        let mut future = entry(b"k1");
        future.not_before = Some(now() + Duration::days(1));
        let err = lookup(&list(vec![future]), b"k1", CertType::Test, None, now()).unwrap_err();
        assert!(matches!(err, CacheError::KeyNotYetValid { .. }));
    }

    #[test]
    fn test_lookup_suitability() {
        let mut vaccination_only = entry(b"k1");
        vaccination_only.usage = vec![CertType::Vaccination];
        let trust_list = list(vec![vaccination_only]);

        assert!(lookup(&trust_list, b"k1", CertType::Vaccination, None, now()).is_ok());
        let err = lookup(&trust_list, b"k1", CertType::Recovery, None, now()).unwrap_err();
        assert!(
            matches!(err, CacheError::KeySuitability { cert_type, .. } if cert_type == "recovery")
        );
    }

    #[test]
    fn test_lookup_cwt_checks() {
        let trust_list = list(vec![entry(b"k1")]);
        let valid = CwtClaims {
            issued_at: Some(now() - Duration::hours(1)),
            expires_at: Some(now() + Duration::hours(1)),
        };
        assert!(lookup(&trust_list, b"k1", CertType::Test, Some(&valid), now()).is_ok());

        let expired = CwtClaims {
            expires_at: Some(now()),
            ..valid
        };
        let err = lookup(&trust_list, b"k1", CertType::Test, Some(&expired), now()).unwrap_err();
        assert!(matches!(err, CacheError::CwtExpired));

        let future = CwtClaims {
            issued_at: Some(now() + Duration::seconds(1)),
            ..valid
        };
        let err = lookup(&trust_list, b"k1", CertType::Test, Some(&future), now()).unwrap_err();
        assert!(matches!(err, CacheError::CwtNotYetValid));

        // Without issued-at the token window is not checked.
        let partial = CwtClaims {
            issued_at: None,
            expires_at: Some(now() - Duration::days(1)),
        };
        assert!(lookup(&trust_list, b"k1", CertType::Test, Some(&partial), now()).is_ok());
    }

    #[test]
    fn test_lookup_key_creation() {
        let mut missing = entry(b"k1");
        missing.public_key = None;
        let err = lookup(&list(vec![missing]), b"k1", CertType::Test, None, now()).unwrap_err();
        assert!(matches!(err, CacheError::KeyCreation { .. }));

        let mut garbage = entry(b"k1");
        garbage.public_key = Some(BASE64.encode(b"not der"));
        let err = lookup(&list(vec![garbage]), b"k1", CertType::Test, None, now()).unwrap_err();
        assert!(matches!(err, CacheError::KeyCreation { .. }));
    }
}

//! Error types for the signed data caches.

use std::fmt;

/// Finer cause behind a [`CacheError::TrustService`].
///
/// Callers usually treat every trust-service failure the same way
/// ("cannot establish current trusted data"), but the cause is kept for
/// logging and for callers that need to tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustFailure {
    /// Connection, TLS, timeout or body read failure.
    Transport,

    /// The endpoint answered with something other than HTTP 200.
    Status(u16),

    /// The detached signature could not be parsed.
    Malformed,

    /// The signature was not produced by the configured trust anchor.
    UntrustedSigner,

    /// The signed statement is past its expiry.
    SignatureExpired,

    /// The signed statement is not valid yet.
    SignatureNotYetValid,
}

impl fmt::Display for TrustFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Status(code) => write!(f, "HTTP {}", code),
            Self::Malformed => write!(f, "malformed signature"),
            Self::UntrustedSigner => write!(f, "untrusted signer"),
            Self::SignatureExpired => write!(f, "signature expired"),
            Self::SignatureNotYetValid => write!(f, "signature not yet valid"),
        }
    }
}

/// Cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Current trusted data could not be established (network or validation).
    #[error("trust service error ({kind}): {message}")]
    TrustService { kind: TrustFailure, message: String },

    /// The cached snapshot is older than its maximum age.
    #[error("cached data expired at {expired_at}")]
    DataExpired {
        expired_at: chrono::DateTime<chrono::Utc>,
    },

    /// A freshly downloaded payload could not be decoded.
    #[error("failed to decode payload: {message}")]
    Decode { message: String },

    /// Key id is not in the trust list.
    #[error("key not in trust list: {key_id}")]
    KeyNotFound { key_id: String },

    /// Key is not allowed to sign this kind of certificate.
    #[error("public key {key_id} is not suitable for {cert_type}")]
    KeySuitability { key_id: String, cert_type: String },

    /// Key validity window has ended.
    #[error("public key expired: {key_id}")]
    KeyExpired { key_id: String },

    /// Key validity window has not started.
    #[error("public key not yet valid: {key_id}")]
    KeyNotYetValid { key_id: String },

    /// Trust list entry carries no usable public key.
    #[error("cannot create public key {key_id}: {reason}")]
    KeyCreation { key_id: String, reason: String },

    /// Certificate token is past its expiry.
    #[error("certificate token expired")]
    CwtExpired,

    /// Certificate token was issued in the future.
    #[error("certificate token not yet valid")]
    CwtNotYetValid,

    /// Persistence failure. Never fatal for the in-memory snapshot.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl CacheError {
    /// Build a trust-service error.
    pub fn trust_service(kind: TrustFailure, message: impl Into<String>) -> Self {
        Self::TrustService {
            kind,
            message: message.into(),
        }
    }

    /// Build a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Exit code for CLI embedding.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 1,

            // Network / validation
            Self::TrustService { .. } => 2,
            Self::Decode { .. } => 2,

            // Stale data
            Self::DataExpired { .. } => 3,

            // Key checks
            Self::KeyNotFound { .. } => 4,
            Self::KeySuitability { .. } => 4,
            Self::KeyExpired { .. } => 4,
            Self::KeyNotYetValid { .. } => 4,
            Self::KeyCreation { .. } => 4,
            Self::CwtExpired => 4,
            Self::CwtNotYetValid => 4,

            Self::Storage { .. } => 6,
        }
    }

    /// Whether this is a trust-service failure.
    pub fn is_trust_service_error(&self) -> bool {
        matches!(self, Self::TrustService { .. })
    }

    /// Finer trust-service cause, if any.
    pub fn trust_failure(&self) -> Option<TrustFailure> {
        match self {
            Self::TrustService { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        Self::trust_service(TrustFailure::Transport, err.to_string())
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

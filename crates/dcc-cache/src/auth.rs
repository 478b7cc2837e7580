//! API key authentication for the signed data endpoints.
//!
//! The key, when present, is sent verbatim in the `X-Token` header of both
//! the signature and the payload request.

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-Token";

/// API key provider.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum ApiKey {
    /// Static key (from config or env).
    Static(String),

    /// No authentication.
    #[default]
    None,
}

impl ApiKey {
    /// Create a static key provider.
    pub fn static_key(key: impl Into<String>) -> Self {
        Self::Static(key.into())
    }

    /// Build from an optional configured key; empty strings mean no key.
    pub fn from_option(key: Option<&str>) -> Self {
        match key {
            Some(k) if !k.is_empty() => Self::Static(k.to_string()),
            _ => Self::None,
        }
    }

    /// Create from an environment variable.
    pub fn from_env(var: &str) -> Self {
        Self::from_option(std::env::var(var).ok().as_deref())
    }

    /// Current key, if any.
    pub fn get(&self) -> Option<&str> {
        match self {
            Self::Static(key) => Some(key),
            Self::None => None,
        }
    }

    /// Check if authentication is configured.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::None)
    }
}

// Keys must never end up in logs.
impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => write!(f, "ApiKey::Static(***)"),
            Self::None => write!(f, "ApiKey::None"),
        }
    }
}

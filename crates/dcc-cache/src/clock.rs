//! Injectable clock.
//!
//! Every freshness and expiration decision goes through a [`DateService`],
//! so tests can drive time deterministically with [`ManualDateService`].

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Source of "now".
pub trait DateService: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Whether now is strictly before `date`.
    fn is_now_before(&self, date: DateTime<Utc>) -> bool {
        self.now() < date
    }

    /// Whether now is strictly after `date`.
    fn is_now_after(&self, date: DateTime<Utc>) -> bool {
        self.now() > date
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDateService;

impl DateService for SystemDateService {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualDateService {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualDateService {
    /// Create a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl DateService for ManualDateService {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

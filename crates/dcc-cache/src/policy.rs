//! Freshness and expiration rules.
//!
//! Pure functions of their inputs; no I/O, no clock access.

use chrono::{DateTime, Duration, Utc};

/// Whether a refresh should hit the network.
///
/// Due when forced, when nothing has ever been cached, or once
/// `last_update + update_interval` has been reached.
pub fn is_refresh_due(
    last_update: DateTime<Utc>,
    update_interval: Duration,
    force: bool,
    has_data: bool,
    now: DateTime<Utc>,
) -> bool {
    if force || !has_data {
        return true;
    }
    now >= last_update + update_interval
}

/// Instant after which a snapshot must no longer be served.
pub fn expiration_date(last_update: DateTime<Utc>, maximum_age: Duration) -> DateTime<Utc> {
    last_update + maximum_age
}

/// Whether a snapshot last updated at `last_update` is expired at `now`.
pub fn is_expired(last_update: DateTime<Utc>, maximum_age: Duration, now: DateTime<Utc>) -> bool {
    now >= expiration_date(last_update, maximum_age)
}

//! Time helpers for catalog timestamps and authorization expiry.
//!
//! Catalogs carry RFC 3339 UTC timestamps; authorizations carry an expiry
//! instant. Both go through these helpers so tests can reason about one
//! clock source.

use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Current UTC instant, truncated to whole seconds
///
/// Sub-second precision is dropped so a timestamp survives a JSON round
/// trip unchanged.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Current Unix timestamp in seconds
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// An instant `days` from now
pub fn days_from_now(days: i64) -> DateTime<Utc> {
    now() + Duration::days(days)
}

/// Whether `expires` lies in the past
pub fn is_expired(expires: &DateTime<Utc>) -> bool {
    *expires <= Utc::now()
}

//! Expiry checks for stored credentials.

use crate::credentials::CredentialRecord;
use chrono::{DateTime, Duration, Utc};

/// Returns true if `record` cannot be used as-is at `now`.
///
/// Absent records and records without `expires_at` count as expired.
pub fn is_expired(record: Option<&CredentialRecord>, now: DateTime<Utc>) -> bool {
    is_expired_within(record, now, Duration::zero())
}

/// Like [`is_expired`], but a token expiring within `margin` of `now` is
/// already considered expired. A margin reaching past the representable
/// date range counts as expired.
pub fn is_expired_within(
    record: Option<&CredentialRecord>,
    now: DateTime<Utc>,
    margin: Duration,
) -> bool {
    match record.and_then(|r| r.expires_at) {
        Some(expires_at) => now
            .checked_add_signed(margin)
            .map_or(true, |deadline| deadline >= expires_at),
        None => true,
    }
}

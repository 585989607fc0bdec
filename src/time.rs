//! Millisecond wall-clock timestamps.
//!
//! All packet timestamps are 64-bit millisecond UTC epoch values. On the wire
//! the responder echoes only the low 32 bits of each recorded ping timestamp;
//! see [`truncate_timestamp`].

use chrono::Utc;

/// Returns the current UTC time as milliseconds since the Unix epoch.
///
/// ```
/// let now = linkbird::time::unix_millis();
/// assert!(now > 1_600_000_000_000);
/// ```
#[must_use]
pub fn unix_millis() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Truncates a 64-bit millisecond timestamp to its wire form (low 32 bits).
///
/// Records are keyed on `t mod 2^32` for wire compactness. The prober keeps
/// the full 64-bit values it sent, so comparing low bits is unambiguous within
/// the record retention window.
#[must_use]
pub fn truncate_timestamp(t: u64) -> u32 {
    t as u32
}

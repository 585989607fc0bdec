//! Bounded per-peer store of accepted ping records.
//!
//! The responder keeps, per observed peer address, an arrival-ordered log of
//! `(sent timestamp, delay)` pairs. Logs are bounded both in length
//! ([`RECORD_KEEP_MAX_NUM`]) and in record age ([`RECORD_KEEP_MAX_SECS`]);
//! pruning happens lazily on insert and before every stat response.
//!
//! The store is an owned value with every method taking an explicit `now_ms`,
//! so tests can drive a simulated clock deterministically.

use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;

/// Upper bound on an accepted ping's one-way delay, in seconds.
///
/// Doubles as the replay window: a replayed or clock-skewed PING whose
/// embedded timestamp is outside `(0, MAX_DELAY_SECS)` seconds in the past is
/// rejected.
pub const MAX_DELAY_SECS: u64 = 10;

/// Maximum wall-clock age of a retained record.
pub const RECORD_KEEP_MAX_SECS: u64 = 6 * 3600;

/// Maximum number of records retained per peer.
pub const RECORD_KEEP_MAX_NUM: usize = 128;

/// One accepted ping.
///
/// The full 64-bit origin timestamp is kept here; truncation to 32 bits
/// happens only when the record is serialized into a RESP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRecord {
    /// Sender's millisecond timestamp embedded in the PING.
    pub sent_at_ms: u64,
    /// Observed delay at receipt, in milliseconds.
    pub delay_ms: u16,
}

/// A PING whose delay fell outside the accepted `(0, 10s)` window.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unaccepted delta time {0}ms")]
pub struct DelayOutOfRange(pub i64);

/// Per-peer record logs, keyed by the peer's socket address as observed on
/// the wire.
///
/// The address is not a security boundary (the tag proves knowledge of the
/// key, not of the address); it only partitions records between peers.
#[derive(Debug, Default)]
pub struct RecordStore {
    peers: HashMap<SocketAddr, Vec<PingRecord>>,
}

impl RecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an accepted ping for `addr` and returns the computed delay.
    ///
    /// # Errors
    /// `DelayOutOfRange` if `now_ms - sent_at_ms` is not strictly inside
    /// `(0, MAX_DELAY_SECS * 1000)`; nothing is stored in that case.
    pub fn record_ping(
        &mut self,
        addr: SocketAddr,
        sent_at_ms: u64,
        now_ms: u64,
    ) -> Result<u16, DelayOutOfRange> {
        let delta = now_ms as i64 - sent_at_ms as i64;
        if delta <= 0 || delta >= (MAX_DELAY_SECS * 1000) as i64 {
            return Err(DelayOutOfRange(delta));
        }
        let delay_ms = delta as u16;

        let log = self.peers.entry(addr).or_default();
        log.push(PingRecord {
            sent_at_ms,
            delay_ms,
        });
        Self::prune_log(log, now_ms);
        Ok(delay_ms)
    }

    /// Returns `addr`'s surviving records in arrival order (oldest first),
    /// pruning expired ones first. Unknown peers yield an empty slice.
    pub fn records_for(&mut self, addr: SocketAddr, now_ms: u64) -> &[PingRecord] {
        match self.peers.get_mut(&addr) {
            Some(log) => {
                Self::prune_log(log, now_ms);
                log
            }
            None => &[],
        }
    }

    /// Global expiry pass over all peers.
    ///
    /// A peer whose most recent record has aged past [`RECORD_KEEP_MAX_SECS`]
    /// is dropped entirely; otherwise only its expired records are removed.
    pub fn prune_all(&mut self, now_ms: u64) {
        self.peers.retain(|_, log| {
            let newest_alive = log
                .last()
                .is_some_and(|r| !Self::expired(r, now_ms));
            if newest_alive {
                Self::prune_log(log, now_ms);
            }
            newest_alive && !log.is_empty()
        });
    }

    /// Number of peers currently holding records.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn expired(record: &PingRecord, now_ms: u64) -> bool {
        now_ms.saturating_sub(record.sent_at_ms) >= RECORD_KEEP_MAX_SECS * 1000
    }

    fn prune_log(log: &mut Vec<PingRecord>, now_ms: u64) {
        log.retain(|r| !Self::expired(r, now_ms));
        if log.len() > RECORD_KEEP_MAX_NUM {
            let excess = log.len() - RECORD_KEEP_MAX_NUM;
            log.drain(..excess);
        }
    }
}

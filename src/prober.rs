//! Active prober: ping bursts, retrying stat fetch, per-cycle statistics.
//!
//! One [`Prober`] instance is bound to one peer and one socket. A measurement
//! cycle sends a spaced burst of PINGs, asks the responder which of them it
//! registered, and turns the answer into a [`TestResult`]. Cycles are
//! independent; the outstanding-pings set never survives a cycle.

use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use log::debug;
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::{
    crypto::Psk,
    netdev,
    packets::{self, PacketType, RespPayload},
    records::MAX_DELAY_SECS,
    stats::TestResult,
    time::{truncate_timestamp, unix_millis},
};

/// Pings sent per measurement cycle.
pub const DEFAULT_PING_COUNT: usize = 5;

/// Spacing between pings of one burst.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(100);

/// Base timeout scaled by [`STAT_RETRY_SCALE`] for each stat attempt.
pub const DEFAULT_BASE_TIMEOUT: Duration = Duration::from_secs(3);

/// Per-attempt timeout multipliers: 0.6s, 1.2s, 2.4s, 4.8s at the default
/// base timeout.
const STAT_RETRY_SCALE: [f64; 4] = [0.2, 0.4, 0.8, 1.6];

/// Errors ending a measurement cycle.
///
/// All of these are caught at the cycle boundary by the daemon and recorded
/// as "no data for this peer this cycle"; none of them aborts the process.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// All stat attempts exhausted without an authenticated matching RESP.
    #[error("no response after {0} stat attempts")]
    NoResponse(usize),

    /// Zero sent or zero matched pings; no statistics can be derived.
    #[error("no usable ping records in the response")]
    InsufficientData,

    /// Socket-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The active side of the heartbeat protocol, bound to a single peer.
pub struct Prober {
    socket: UdpSocket,
    psk: Psk,
    peer: SocketAddr,
    /// Full 64-bit timestamps of pings sent this cycle. Only the low 32 bits
    /// travel on the wire, so matching compares truncations of these values.
    outstanding: HashSet<u64>,
    base_timeout: Duration,
}

impl Prober {
    /// Creates a prober with a fresh socket connected to `peer`, optionally
    /// bound to the network device `device` (Linux only).
    pub async fn connect(
        psk: Psk,
        peer: SocketAddr,
        device: Option<&str>,
    ) -> std::io::Result<Self> {
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let std_socket = std::net::UdpSocket::bind(local)?;
        if let Some(device) = device {
            netdev::bind_to_device(&std_socket, device)?;
        }
        std_socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(std_socket)?;
        socket.connect(peer).await?;

        Ok(Prober {
            socket,
            psk,
            peer,
            outstanding: HashSet::new(),
            base_timeout: DEFAULT_BASE_TIMEOUT,
        })
    }

    /// Overrides the base stat timeout (3s by default).
    #[must_use]
    pub fn with_base_timeout(mut self, base_timeout: Duration) -> Self {
        self.base_timeout = base_timeout;
        self
    }

    /// The peer this prober measures.
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one PING carrying the current timestamp. Fire-and-forget: the
    /// protocol has no acknowledgment for pings.
    pub async fn ping(&mut self) -> std::io::Result<()> {
        let t = unix_millis();
        let pkt = packets::encode(&self.psk, PacketType::Ping, &packets::timestamp_payload(t));
        self.socket.send(&pkt).await?;
        self.outstanding.insert(t);
        Ok(())
    }

    /// Runs one full measurement cycle: `count` pings spaced by `interval`,
    /// one extra `interval` for in-flight pings to land, then a stat fetch.
    ///
    /// # Errors
    /// `NoResponse` if every stat attempt times out, `InsufficientData` if
    /// the response contains nothing attributable to this cycle.
    pub async fn perform_test(
        &mut self,
        count: usize,
        interval: Duration,
    ) -> Result<TestResult, ProbeError> {
        self.outstanding.clear();

        for _ in 0..count {
            self.ping().await?;
            tokio::time::sleep(interval).await;
        }
        // let the last ping arrive before asking for the tally
        tokio::time::sleep(interval).await;

        let (sent_count, delays) = self.fetch_stats().await?;
        TestResult::from_delays(sent_count, &delays).ok_or(ProbeError::InsufficientData)
    }

    /// Requests the responder's record log and matches it against this
    /// cycle's outstanding pings.
    ///
    /// Returns `(sent_count, matched delays)`. `sent_count` estimates how
    /// many pings the responder could plausibly still have had in its window:
    /// the number of outstanding pings at or after the earliest matched
    /// timestamp. The estimate compensates for records the responder pruned
    /// before the request arrived.
    pub async fn fetch_stats(&mut self) -> Result<(usize, Vec<u16>), ProbeError> {
        let mut buf = [0u8; 2048];
        let mut response: Option<RespPayload> = None;

        'attempts: for scale in STAT_RETRY_SCALE {
            let request_ms = unix_millis();
            let request = packets::encode(
                &self.psk,
                PacketType::Stat,
                &packets::timestamp_payload(request_ms),
            );
            self.socket.send(&request).await?;

            // Stray datagrams (typically a late RESP to the previous
            // attempt's request) must not consume the attempt: keep reading
            // until the deadline, rejecting anything check_response refuses.
            let wait = self.base_timeout.mul_f64(scale);
            let attempt_start = Instant::now();
            loop {
                let remaining = wait.saturating_sub(attempt_start.elapsed());
                match tokio::time::timeout(remaining, self.socket.recv(&mut buf)).await {
                    Err(_) => {
                        debug!("stat attempt to {} timed out after {:?}", self.peer, wait);
                        break;
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Ok(Ok(len)) => {
                        if let Some(payload) = self.check_response(&buf[..len], request_ms) {
                            response = Some(payload);
                            break 'attempts;
                        }
                    }
                }
            }
        }

        let response = response.ok_or(ProbeError::NoResponse(STAT_RETRY_SCALE.len()))?;

        let truncated: HashSet<u32> = self
            .outstanding
            .iter()
            .map(|&t| truncate_timestamp(t))
            .collect();

        let mut delays = Vec::new();
        let mut first_matched: Option<u32> = None;
        for (t, delay) in response.records {
            if truncated.contains(&t) {
                delays.push(delay);
                first_matched = Some(first_matched.map_or(t, |first| first.min(t)));
            }
        }

        let sent_count = match first_matched {
            Some(first) => self
                .outstanding
                .iter()
                .filter(|&&t| truncate_timestamp(t) >= first)
                .count(),
            None => 0,
        };

        Ok((sent_count, delays))
    }

    /// Validates one received datagram against an in-flight stat request.
    ///
    /// Rejects anything that fails authentication, is not a RESP, does not
    /// echo our request id, or was built too long ago (a stale or replayed
    /// response from an earlier cycle).
    fn check_response(&self, raw: &[u8], request_ms: u64) -> Option<RespPayload> {
        let (packet_type, payload) = match packets::decode(&self.psk, raw) {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!("{}, ignored", err);
                return None;
            }
        };
        if packet_type != PacketType::Resp {
            debug!("unexpected {:?} while waiting for RESP, ignored", packet_type);
            return None;
        }

        let payload = match RespPayload::parse(payload) {
            Ok(p) => p,
            Err(err) => {
                debug!("bad RESP: {}, ignored", err);
                return None;
            }
        };

        if payload.request_ms != request_ms {
            debug!(
                "RESP for request {} while waiting for {}, ignored",
                payload.request_ms, request_ms
            );
            return None;
        }

        let age = unix_millis() as i64 - payload.responded_at_ms as i64;
        if age >= (MAX_DELAY_SECS * 1000) as i64 {
            debug!("delayed RESP ({}ms old), ignored", age);
            return None;
        }

        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_without_device_binding() {
        let psk = Psk::new(vec![0x11; 16]).unwrap();
        let peer: SocketAddr = "127.0.0.1:3322".parse().unwrap();
        let prober = Prober::connect(psk, peer, None).await.unwrap();
        assert_eq!(prober.peer(), peer);
    }

    #[tokio::test]
    async fn ping_tracks_full_timestamps() {
        let psk = Psk::new(vec![0x22; 16]).unwrap();
        // sink socket so sends do not error
        let sink = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = sink.local_addr().unwrap();

        let mut prober = Prober::connect(psk, peer, None).await.unwrap();
        prober.ping().await.unwrap();
        assert_eq!(prober.outstanding.len(), 1);

        let &t = prober.outstanding.iter().next().unwrap();
        // the set holds the full 64-bit value, not the truncation
        assert!(t > u64::from(u32::MAX));
    }
}

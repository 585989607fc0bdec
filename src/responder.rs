//! Passive responder: records incoming pings, answers stat requests.
//!
//! The responder processes one datagram at a time: decode, authenticate,
//! apply, possibly reply. There is no session concept and no concurrent
//! mutation of the record store. Malformed or unauthenticated datagrams are
//! logged and dropped without any reply, so the responder cannot be used as
//! a reflection oracle.

use std::net::SocketAddr;

use log::{debug, warn};
use tokio::net::UdpSocket;

use crate::{
    crypto::Psk,
    packets::{self, PacketType, RespPayload, WireError},
    records::RecordStore,
    time::{truncate_timestamp, unix_millis},
};

/// Receive buffer size; a full RESP for 128 records is 801 bytes.
const RECV_BUF_LEN: usize = 2048;

/// The passive side of the heartbeat protocol.
pub struct Responder {
    psk: Psk,
    store: RecordStore,
}

impl Responder {
    /// Creates a responder with an empty record store.
    #[must_use]
    pub fn new(psk: Psk) -> Self {
        Responder {
            psk,
            store: RecordStore::new(),
        }
    }

    /// Processes one datagram received from `addr` and returns the reply to
    /// send back, if any.
    ///
    /// Only STAT requests produce a reply; PING packets are recorded
    /// silently and everything else is dropped.
    pub fn handle_datagram(
        &mut self,
        raw: &[u8],
        addr: SocketAddr,
        now_ms: u64,
    ) -> Option<Vec<u8>> {
        let (packet_type, payload) = match packets::decode(&self.psk, raw) {
            Ok(decoded) => decoded,
            Err(err @ WireError::ShortPacket(_)) => {
                debug!("{} from {}, ignored", err, addr);
                return None;
            }
            Err(err) => {
                warn!("{} from {}, ignored", err, addr);
                return None;
            }
        };

        match packet_type {
            PacketType::Ping => {
                self.handle_ping(payload, addr, now_ms);
                None
            }
            PacketType::Stat => self.handle_stat(payload, addr, now_ms),
            PacketType::Resp => {
                warn!("unexpected RESP from {}, ignored", addr);
                None
            }
        }
    }

    fn handle_ping(&mut self, payload: &[u8], addr: SocketAddr, now_ms: u64) {
        let sent_at_ms = match packets::parse_timestamp(payload) {
            Ok(t) => t,
            Err(err) => {
                warn!("bad PING from {}: {}, ignored", addr, err);
                return;
            }
        };

        match self.store.record_ping(addr, sent_at_ms, now_ms) {
            Ok(delay_ms) => debug!("ping from {}: {}ms", addr, delay_ms),
            Err(err) => warn!("{} from {}, ignored", err, addr),
        }
    }

    fn handle_stat(&mut self, payload: &[u8], addr: SocketAddr, now_ms: u64) -> Option<Vec<u8>> {
        let request_ms = match packets::parse_timestamp(payload) {
            Ok(t) => t,
            Err(err) => {
                warn!("bad STAT from {}: {}, ignored", addr, err);
                return None;
            }
        };

        self.store.prune_all(now_ms);

        let records = self
            .store
            .records_for(addr, now_ms)
            .iter()
            .map(|r| (truncate_timestamp(r.sent_at_ms), r.delay_ms))
            .collect();
        let payload = RespPayload {
            responded_at_ms: now_ms,
            request_ms,
            records,
        };

        debug!(
            "stat request from {}: {} records",
            addr,
            payload.records.len()
        );
        Some(packets::encode(
            &self.psk,
            PacketType::Resp,
            &payload.to_bytes(),
        ))
    }

    /// Runs the receive loop on `socket` until the socket fails.
    ///
    /// Each datagram is fully processed before the next one is read, so the
    /// record store needs no locking.
    pub async fn run(mut self, socket: UdpSocket) -> std::io::Result<()> {
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            let (len, addr) = socket.recv_from(&mut buf).await?;
            if let Some(reply) = self.handle_datagram(&buf[..len], addr, unix_millis()) {
                if let Err(e) = socket.send_to(&reply, addr).await {
                    warn!("failed to send RESP to {}: {}", addr, e);
                }
            }
        }
    }
}

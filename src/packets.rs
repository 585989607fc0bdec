//! Wire codec for the heartbeat protocol.
//!
//! Every datagram is `type (1 byte) || payload || tag (16 bytes)` with all
//! integers in big-endian byte order. The tag is a keyed digest over
//! `type || payload` (see [`crate::crypto`]) and is verified before any part
//! of the payload is trusted.
//!
//! ```text
//!  0                   1
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+----
//! |     Type      |    Payload ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+----
//! |              Tag (16 octets)
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+----
//! ```
//!
//! PING and STAT carry an 8-byte millisecond timestamp. RESP carries the
//! responder's own timestamp, the echoed STAT request id and a list of
//! `(truncated timestamp, delay)` records in arrival order.

use thiserror::Error;

use crate::crypto::{Psk, TAG_LENGTH};

/// Minimum valid datagram length: type byte plus tag, with an empty payload.
pub const MIN_PACKET_LENGTH: usize = 1 + TAG_LENGTH;

/// Length of the timestamp payload used by PING and STAT.
pub const TIMESTAMP_PAYLOAD_LENGTH: usize = 8;

/// Fixed RESP header: 8-byte response time plus 8-byte echoed request id.
pub const RESP_HEADER_LENGTH: usize = 16;

/// Wire size of one `(truncated timestamp, delay)` record.
pub const RECORD_WIRE_LENGTH: usize = 6;

/// Packet types of the heartbeat protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// One-way heartbeat carrying the sender's timestamp. Never answered.
    Ping = 0,
    /// Request for the responder's record log. Answered with `Resp`.
    Stat = 1,
    /// Reply to a `Stat` request.
    Resp = 2,
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(PacketType::Ping),
            1 => Ok(PacketType::Stat),
            2 => Ok(PacketType::Resp),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

/// Errors raised while parsing or authenticating datagrams.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Datagram shorter than type byte plus tag.
    #[error("packet of {0} bytes is below the {MIN_PACKET_LENGTH}-byte minimum")]
    ShortPacket(usize),

    /// Authentication tag did not match.
    #[error("wrong auth digest")]
    AuthFailure,

    /// Type byte outside the protocol vocabulary.
    #[error("unknown packet type {0}")]
    UnknownType(u8),

    /// Payload too short for its packet type.
    #[error("payload truncated: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Builds an authenticated datagram from a type and payload.
#[must_use]
pub fn encode(psk: &Psk, packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(1 + payload.len() + TAG_LENGTH);
    pkt.push(packet_type as u8);
    pkt.extend_from_slice(payload);
    let tag = psk.tag(&pkt);
    pkt.extend_from_slice(&tag);
    pkt
}

/// Parses and authenticates a datagram, returning its type and payload.
///
/// The tag is verified (constant-time) before the type byte is interpreted,
/// so any single-bit corruption anywhere in the datagram surfaces as
/// `AuthFailure` rather than as a bogus type or payload.
///
/// # Errors
/// `ShortPacket` if the datagram cannot hold a type byte and a tag,
/// `AuthFailure` on tag mismatch, `UnknownType` for out-of-vocabulary types.
pub fn decode<'a>(psk: &Psk, raw: &'a [u8]) -> Result<(PacketType, &'a [u8]), WireError> {
    if raw.len() < MIN_PACKET_LENGTH {
        return Err(WireError::ShortPacket(raw.len()));
    }

    let (signed, tag) = raw.split_at(raw.len() - TAG_LENGTH);
    if !psk.verify(signed, tag) {
        return Err(WireError::AuthFailure);
    }

    let packet_type = PacketType::try_from(signed[0])?;
    Ok((packet_type, &signed[1..]))
}

/// Serializes the 8-byte timestamp payload used by PING and STAT.
#[must_use]
pub fn timestamp_payload(timestamp_ms: u64) -> [u8; TIMESTAMP_PAYLOAD_LENGTH] {
    timestamp_ms.to_be_bytes()
}

/// Parses the 8-byte timestamp payload of a PING or STAT packet.
///
/// # Errors
/// `Truncated` if the payload is shorter than 8 bytes. Trailing bytes are
/// ignored for forward compatibility.
pub fn parse_timestamp(payload: &[u8]) -> Result<u64, WireError> {
    if payload.len() < TIMESTAMP_PAYLOAD_LENGTH {
        return Err(WireError::Truncated {
            expected: TIMESTAMP_PAYLOAD_LENGTH,
            actual: payload.len(),
        });
    }
    let mut buf = [0u8; TIMESTAMP_PAYLOAD_LENGTH];
    buf.copy_from_slice(&payload[..TIMESTAMP_PAYLOAD_LENGTH]);
    Ok(u64::from_be_bytes(buf))
}

/// Payload of a RESP packet.
///
/// Wire format:
/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       Response time (ms)      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       Echoed request id       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Trunc. ts (4)  | Delay | ...   repeated per record, oldest first
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespPayload {
    /// Responder's wall clock when the reply was built, in ms.
    pub responded_at_ms: u64,
    /// The STAT request timestamp, echoed verbatim for correlation.
    pub request_ms: u64,
    /// `(truncated timestamp, delay in ms)` records in arrival order.
    pub records: Vec<(u32, u16)>,
}

impl RespPayload {
    /// Serializes the payload in big-endian wire format.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(RESP_HEADER_LENGTH + self.records.len() * RECORD_WIRE_LENGTH);
        buf.extend_from_slice(&self.responded_at_ms.to_be_bytes());
        buf.extend_from_slice(&self.request_ms.to_be_bytes());
        for &(truncated_ts, delay_ms) in &self.records {
            buf.extend_from_slice(&truncated_ts.to_be_bytes());
            buf.extend_from_slice(&delay_ms.to_be_bytes());
        }
        buf
    }

    /// Parses a RESP payload.
    ///
    /// # Errors
    /// `Truncated` if the header is incomplete or a trailing record is partial.
    pub fn parse(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < RESP_HEADER_LENGTH {
            return Err(WireError::Truncated {
                expected: RESP_HEADER_LENGTH,
                actual: payload.len(),
            });
        }

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&payload[0..8]);
        let responded_at_ms = u64::from_be_bytes(ts);
        ts.copy_from_slice(&payload[8..16]);
        let request_ms = u64::from_be_bytes(ts);

        let body = &payload[RESP_HEADER_LENGTH..];
        if body.len() % RECORD_WIRE_LENGTH != 0 {
            return Err(WireError::Truncated {
                expected: body.len() + RECORD_WIRE_LENGTH - body.len() % RECORD_WIRE_LENGTH,
                actual: body.len(),
            });
        }

        let mut records = Vec::with_capacity(body.len() / RECORD_WIRE_LENGTH);
        for chunk in body.chunks_exact(RECORD_WIRE_LENGTH) {
            let truncated_ts = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let delay_ms = u16::from_be_bytes([chunk[4], chunk[5]]);
            records.push((truncated_ts, delay_ms));
        }

        Ok(RespPayload {
            responded_at_ms,
            request_ms,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_psk() -> Psk {
        Psk::new(b"unit-test-key-0123".to_vec()).unwrap()
    }

    #[test]
    fn round_trip_all_types() {
        let psk = test_psk();
        for packet_type in [PacketType::Ping, PacketType::Stat, PacketType::Resp] {
            let payload = timestamp_payload(1_700_000_123_456);
            let pkt = encode(&psk, packet_type, &payload);
            let (decoded_type, decoded_payload) = decode(&psk, &pkt).unwrap();
            assert_eq!(decoded_type, packet_type);
            assert_eq!(decoded_payload, payload);
        }
    }

    #[test]
    fn round_trip_empty_payload() {
        let psk = test_psk();
        let pkt = encode(&psk, PacketType::Ping, &[]);
        assert_eq!(pkt.len(), MIN_PACKET_LENGTH);
        let (packet_type, payload) = decode(&psk, &pkt).unwrap();
        assert_eq!(packet_type, PacketType::Ping);
        assert!(payload.is_empty());
    }

    #[test]
    fn short_packet_rejected() {
        let psk = test_psk();
        assert_eq!(decode(&psk, &[]), Err(WireError::ShortPacket(0)));
        assert_eq!(decode(&psk, &[0u8; 16]), Err(WireError::ShortPacket(16)));
        // 17 bytes is long enough to reach the auth check
        assert_eq!(decode(&psk, &[0u8; 17]), Err(WireError::AuthFailure));
    }

    #[test]
    fn single_bit_flip_fails_auth() {
        let psk = test_psk();
        let pkt = encode(&psk, PacketType::Stat, &timestamp_payload(1_700_000_000_000));

        for byte in 0..pkt.len() {
            for bit in 0..8 {
                let mut tampered = pkt.clone();
                tampered[byte] ^= 1 << bit;
                assert_eq!(
                    decode(&psk, &tampered),
                    Err(WireError::AuthFailure),
                    "flip of byte {byte} bit {bit} was accepted"
                );
            }
        }
    }

    #[test]
    fn wrong_key_fails_auth() {
        let psk = test_psk();
        let other = Psk::new(b"a-different-key-456".to_vec()).unwrap();
        let pkt = encode(&psk, PacketType::Ping, &timestamp_payload(1));
        assert_eq!(decode(&other, &pkt), Err(WireError::AuthFailure));
    }

    #[test]
    fn unknown_type_rejected_after_auth() {
        let psk = test_psk();
        // Hand-build a validly tagged packet with an out-of-vocabulary type.
        let mut pkt = vec![7u8];
        pkt.extend_from_slice(&timestamp_payload(42));
        let tag = psk.tag(&pkt);
        pkt.extend_from_slice(&tag);
        assert_eq!(decode(&psk, &pkt), Err(WireError::UnknownType(7)));
    }

    #[test]
    fn timestamp_payload_round_trip() {
        let t = 1_700_000_123_456u64;
        assert_eq!(parse_timestamp(&timestamp_payload(t)).unwrap(), t);

        assert!(matches!(
            parse_timestamp(&[0u8; 7]),
            Err(WireError::Truncated {
                expected: 8,
                actual: 7
            })
        ));
    }

    #[test]
    fn resp_payload_round_trip() {
        let payload = RespPayload {
            responded_at_ms: 1_700_000_200_000,
            request_ms: 1_700_000_199_500,
            records: vec![(1000, 12), (1100, 9), (1200, 30)],
        };
        let bytes = payload.to_bytes();
        assert_eq!(
            bytes.len(),
            RESP_HEADER_LENGTH + 3 * RECORD_WIRE_LENGTH
        );
        assert_eq!(RespPayload::parse(&bytes).unwrap(), payload);
    }

    #[test]
    fn resp_payload_no_records() {
        let payload = RespPayload {
            responded_at_ms: 5,
            request_ms: 4,
            records: vec![],
        };
        assert_eq!(RespPayload::parse(&payload.to_bytes()).unwrap(), payload);
    }

    #[test]
    fn resp_payload_truncated() {
        let payload = RespPayload {
            responded_at_ms: 5,
            request_ms: 4,
            records: vec![(1, 2)],
        };
        let mut bytes = payload.to_bytes();
        bytes.pop();
        assert!(matches!(
            RespPayload::parse(&bytes),
            Err(WireError::Truncated { .. })
        ));

        assert!(matches!(
            RespPayload::parse(&[0u8; 15]),
            Err(WireError::Truncated { .. })
        ));
    }
}

//! ICMP Echo Request construction and Echo Reply parsing, for both ICMPv4 and ICMPv6.

use std::time::Duration;

use chrono::Utc;
use pnet_packet::icmp::{self, IcmpCode, IcmpTypes};
use pnet_packet::icmpv6::{self, Icmpv6Code, Icmpv6Types};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::{util, Packet};
use thiserror::Error;

use crate::family::AddressFamily;

/// Type, code, checksum, identifier, sequence.
pub const ICMP_HEADER_LEN: usize = 8;

/// Send timestamp followed by [PAYLOAD_FILLER].
pub const PAYLOAD_LEN: usize = 16;

/// Some hosts silently drop echo requests with (too) short payloads, so each request
/// carries this after the timestamp.
pub const PAYLOAD_FILLER: [u8; 8] = *b"alivecrb";

const IPV4_MIN_HEADER_LEN: usize = 20;
const TIMESTAMP_LEN: usize = 8;
/// Index of the checksum among the 16-bit words of an ICMP header.
const CHECKSUM_WORD: usize = 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram too short: {len} bytes, need at least {needed}")]
    Truncated { len: usize, needed: usize },

    #[error("expected an IPv4 header, but got IP version {version}")]
    NotIpv4 { version: u8 },

    #[error("invalid IPv4 header length: {0} bytes")]
    InvalidHeaderLength(usize),

    #[error("not an echo reply: ICMP type {icmp_type}, code {code}")]
    NotEchoReply { icmp_type: u8, code: u8 },
}

fn truncated(buf: &[u8], needed: usize) -> PacketError {
    PacketError::Truncated {
        len: buf.len(),
        needed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoRequest {
    pub identifier: u16,
    pub sequence: u16,
    pub sent_at_nanos: u64,
}

impl EchoRequest {
    pub fn stamped_now(identifier: u16, sequence: u16) -> Self {
        Self {
            identifier,
            sequence,
            sent_at_nanos: now_nanos(),
        }
    }

    fn payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..TIMESTAMP_LEN].copy_from_slice(&self.sent_at_nanos.to_be_bytes());
        payload[TIMESTAMP_LEN..].copy_from_slice(&PAYLOAD_FILLER);
        payload
    }

    /// Encodes the ICMP message (without IP header). The ICMPv6 checksum is left at zero,
    /// because the kernel fills it in for raw ICMPv6 sockets (it needs the pseudo-header).
    pub fn encode(&self, family: AddressFamily) -> Result<Vec<u8>, PacketError> {
        let mut buf = vec![0u8; ICMP_HEADER_LEN + PAYLOAD_LEN];
        let too_short = truncated(&buf, ICMP_HEADER_LEN);
        match family {
            AddressFamily::V4 => {
                let mut packet =
                    icmp::echo_request::MutableEchoRequestPacket::new(&mut buf).ok_or(too_short)?;
                packet.set_icmp_type(IcmpTypes::EchoRequest);
                packet.set_icmp_code(IcmpCode::new(0));
                packet.set_identifier(self.identifier);
                packet.set_sequence_number(self.sequence);
                packet.set_payload(&self.payload());
                let sum = util::checksum(packet.packet(), CHECKSUM_WORD);
                packet.set_checksum(sum);
            }
            AddressFamily::V6 => {
                let mut packet =
                    icmpv6::echo_request::MutableEchoRequestPacket::new(&mut buf).ok_or(too_short)?;
                packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
                packet.set_icmpv6_code(Icmpv6Code::new(0));
                packet.set_identifier(self.identifier);
                packet.set_sequence_number(self.sequence);
                packet.set_payload(&self.payload());
            }
        }
        Ok(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub identifier: u16,
    pub sequence: u16,
    /// Only present if the responder echoed (at least) our timestamp back.
    pub sent_at_nanos: Option<u64>,
}

impl EchoReply {
    /// Parses a datagram as read from a raw socket of the given family. IPv4 raw sockets
    /// deliver the IP header too, IPv6 raw sockets only the ICMPv6 message.
    pub fn decode(family: AddressFamily, datagram: &[u8]) -> Result<Self, PacketError> {
        match family {
            AddressFamily::V4 => {
                let message = strip_ipv4_header(datagram)?;
                let reply = icmp::echo_reply::EchoReplyPacket::new(message)
                    .ok_or_else(|| truncated(message, ICMP_HEADER_LEN))?;
                if reply.get_icmp_type() != IcmpTypes::EchoReply {
                    return Err(PacketError::NotEchoReply {
                        icmp_type: reply.get_icmp_type().0,
                        code: reply.get_icmp_code().0,
                    });
                }
                Ok(Self::from_parts(
                    reply.get_identifier(),
                    reply.get_sequence_number(),
                    reply.payload(),
                ))
            }
            AddressFamily::V6 => {
                let reply = icmpv6::echo_reply::EchoReplyPacket::new(datagram)
                    .ok_or_else(|| truncated(datagram, ICMP_HEADER_LEN))?;
                if reply.get_icmpv6_type() != Icmpv6Types::EchoReply {
                    return Err(PacketError::NotEchoReply {
                        icmp_type: reply.get_icmpv6_type().0,
                        code: reply.get_icmpv6_code().0,
                    });
                }
                Ok(Self::from_parts(
                    reply.get_identifier(),
                    reply.get_sequence_number(),
                    reply.payload(),
                ))
            }
        }
    }

    fn from_parts(identifier: u16, sequence: u16, payload: &[u8]) -> Self {
        let sent_at_nanos = payload
            .get(..TIMESTAMP_LEN)
            .and_then(|raw| <[u8; TIMESTAMP_LEN]>::try_from(raw).ok())
            .map(u64::from_be_bytes);
        Self {
            identifier,
            sequence,
            sent_at_nanos,
        }
    }

    pub fn answers(&self, identifier: u16, sequence: u16) -> bool {
        self.identifier == identifier && self.sequence == sequence
    }

    pub fn round_trip(&self) -> Option<Duration> {
        self.sent_at_nanos
            .and_then(|sent| now_nanos().checked_sub(sent))
            .map(Duration::from_nanos)
    }
}

/// Skips the IPv4 header, whose length is given in 32-bit words by the IHL field.
pub fn strip_ipv4_header(datagram: &[u8]) -> Result<&[u8], PacketError> {
    let header =
        Ipv4Packet::new(datagram).ok_or_else(|| truncated(datagram, IPV4_MIN_HEADER_LEN))?;
    let version = header.get_version();
    if version != 4 {
        return Err(PacketError::NotIpv4 { version });
    }
    let header_len = usize::from(header.get_header_length()) * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return Err(PacketError::InvalidHeaderLength(header_len));
    }
    datagram
        .get(header_len..)
        .ok_or_else(|| truncated(datagram, header_len))
}

fn now_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use assertor::*;

    use super::*;
    use crate::test_utils::{icmp_reply_to, ipv4_header, reply_to};

    #[test]
    fn request_layout_v4() -> Result<()> {
        // given
        let request = EchoRequest {
            identifier: 0x1234,
            sequence: 0xbeef,
            sent_at_nanos: 0x0102030405060708,
        };

        // when
        let encoded = request.encode(AddressFamily::V4)?;

        // then
        assert_that!(encoded.len()).is_equal_to(ICMP_HEADER_LEN + PAYLOAD_LEN);
        assert_that!(encoded[0]).is_equal_to(8);
        assert_that!(encoded[1]).is_equal_to(0);
        assert_eq!(encoded[4..8], [0x12, 0x34, 0xbe, 0xef]);
        assert_eq!(encoded[8..16], [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(encoded[16..24], PAYLOAD_FILLER);
        let stored = u16::from_be_bytes([encoded[2], encoded[3]]);
        assert_that!(stored).is_equal_to(util::checksum(&encoded, CHECKSUM_WORD));
        assert_that!(stored).is_not_equal_to(0);
        Ok(())
    }

    #[test]
    fn request_layout_v6_leaves_checksum_to_kernel() -> Result<()> {
        // given
        let request = EchoRequest::stamped_now(7, 9);

        // when
        let encoded = request.encode(AddressFamily::V6)?;

        // then
        assert_that!(encoded[0]).is_equal_to(128);
        assert_eq!(encoded[2..4], [0, 0]);
        assert_eq!(encoded[4..8], [0, 7, 0, 9]);
        assert_that!(encoded.len()).is_equal_to(ICMP_HEADER_LEN + PAYLOAD_LEN);
        Ok(())
    }

    #[test]
    fn decode_v4_reply_behind_ip_header() -> Result<()> {
        // given
        let request = EchoRequest::stamped_now(42, 4711).encode(AddressFamily::V4)?;
        let datagram = reply_to(AddressFamily::V4, &request);

        // when
        let reply = EchoReply::decode(AddressFamily::V4, &datagram)?;

        // then
        assert_that!(reply.identifier).is_equal_to(42);
        assert_that!(reply.sequence).is_equal_to(4711);
        assert_that!(reply.answers(42, 4711)).is_true();
        assert_that!(reply.round_trip()).is_some();
        Ok(())
    }

    #[test]
    fn decode_v4_with_options() -> Result<()> {
        // given
        let request = EchoRequest::stamped_now(1, 2).encode(AddressFamily::V4)?;
        let mut datagram = ipv4_header(6);
        datagram.extend(icmp_reply_to(AddressFamily::V4, &request));

        // when
        let decoded = EchoReply::decode(AddressFamily::V4, &datagram)?;

        // then
        assert_that!(decoded.answers(1, 2)).is_true();
        Ok(())
    }

    #[test]
    fn decode_v6_reply() -> Result<()> {
        // given
        let request = EchoRequest::stamped_now(3, 4).encode(AddressFamily::V6)?;
        let datagram = reply_to(AddressFamily::V6, &request);

        // when
        let reply = EchoReply::decode(AddressFamily::V6, &datagram)?;

        // then
        assert_that!(reply.answers(3, 4)).is_true();
        assert_that!(reply.answers(3, 5)).is_false();
        assert_that!(reply.answers(4, 4)).is_false();
        Ok(())
    }

    #[test]
    fn decode_rejects_own_request() -> Result<()> {
        // given: v4 raw sockets also see our own requests to local addresses
        let mut datagram = ipv4_header(5);
        datagram.extend(EchoRequest::stamped_now(3, 4).encode(AddressFamily::V4)?);

        // when
        let result = EchoReply::decode(AddressFamily::V4, &datagram);

        // then
        assert_eq!(
            result,
            Err(PacketError::NotEchoReply {
                icmp_type: 8,
                code: 0
            })
        );
        Ok(())
    }

    #[test]
    fn decode_rejects_v4_type_on_v6_socket() -> Result<()> {
        // given
        let mut message = EchoRequest::stamped_now(3, 4).encode(AddressFamily::V6)?;
        message[0] = AddressFamily::V4.echo_reply_type();

        // when
        let result = EchoReply::decode(AddressFamily::V6, &message);

        // then
        assert_that!(result).is_err();
        Ok(())
    }

    #[test]
    fn decode_rejects_malformed_headers() {
        let decode_v4 = |datagram: &[u8]| EchoReply::decode(AddressFamily::V4, datagram);

        assert_eq!(
            decode_v4(&[]),
            Err(PacketError::Truncated {
                len: 0,
                needed: IPV4_MIN_HEADER_LEN
            })
        );
        assert_eq!(decode_v4(&[0x60; 40]), Err(PacketError::NotIpv4 { version: 6 }));
        assert_eq!(decode_v4(&[0x44; 40]), Err(PacketError::InvalidHeaderLength(16)));
        assert_eq!(
            decode_v4(&ipv4_header(5)[..12]),
            Err(PacketError::Truncated { len: 12, needed: 20 })
        );
        assert_eq!(
            decode_v4(&ipv4_header(5)),
            Err(PacketError::Truncated { len: 0, needed: 8 })
        );
        assert_eq!(
            EchoReply::decode(AddressFamily::V6, &[129, 0, 0]),
            Err(PacketError::Truncated { len: 3, needed: 8 })
        );
    }

    #[test]
    fn reply_without_payload_has_no_timestamp() -> Result<()> {
        // given
        let datagram = [129, 0, 0, 0, 0, 1, 0, 2];

        // when
        let reply = EchoReply::decode(AddressFamily::V6, &datagram)?;

        // then
        assert_that!(reply.sent_at_nanos).is_none();
        assert_that!(reply.round_trip()).is_none();
        Ok(())
    }
}

use std::fmt;
use std::net::IpAddr;

use pnet_packet::icmp::IcmpTypes;
use pnet_packet::icmpv6::Icmpv6Types;

/// IP protocol family of a probe target. Each family needs its own raw socket and
/// its own flavour of ICMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    pub fn echo_request_type(self) -> u8 {
        match self {
            Self::V4 => IcmpTypes::EchoRequest.0,
            Self::V6 => Icmpv6Types::EchoRequest.0,
        }
    }

    pub fn echo_reply_type(self) -> u8 {
        match self {
            Self::V4 => IcmpTypes::EchoReply.0,
            Self::V6 => Icmpv6Types::EchoReply.0,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("IPv4"),
            Self::V6 => f.write_str("IPv6"),
        }
    }
}

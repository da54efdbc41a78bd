use std::net::IpAddr;

use pnet_packet::util::checksum;

use crate::family::AddressFamily;

pub fn addr(input: &str) -> IpAddr {
    input.parse().expect(input)
}

pub fn addrs(inputs: &[&str]) -> Vec<IpAddr> {
    inputs.iter().map(|it| addr(it)).collect()
}

/// Minimal IPv4 header of `words` 32-bit words, as the kernel hands it to raw sockets.
pub fn ipv4_header(words: u8) -> Vec<u8> {
    let mut header = vec![0u8; usize::from(words) * 4];
    header[0] = 0x40 | (words & 0x0f);
    header[8] = 64; // ttl
    header[9] = 1; // ICMP
    header
}

/// What a well-behaved host sends back for `request`, without IP header.
pub fn icmp_reply_to(family: AddressFamily, request: &[u8]) -> Vec<u8> {
    let mut reply = request.to_vec();
    reply[0] = family.echo_reply_type();
    if family == AddressFamily::V4 {
        let sum = checksum(&reply, 1);
        reply[2..4].copy_from_slice(&sum.to_be_bytes());
    }
    reply
}

/// What a raw socket of `family` would read for the answer to `request`.
pub fn reply_to(family: AddressFamily, request: &[u8]) -> Vec<u8> {
    let icmp = icmp_reply_to(family, request);
    match family {
        AddressFamily::V4 => {
            let mut datagram = ipv4_header(5);
            datagram.extend(icmp);
            datagram
        }
        AddressFamily::V6 => icmp,
    }
}

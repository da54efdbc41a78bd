use std::net::IpAddr;

use thiserror::Error;

use crate::family::AddressFamily;

/// Reasons a batch could not be probed at all. None of these abort a scan,
/// they are reported for the affected batch only.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("duplicate address in batch: `{0}`")]
    DuplicateAddress(IpAddr),

    #[error("cannot probe an empty batch")]
    EmptyBatch,

    #[error("batch of {len} addresses exceeds the maximum of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("failed to open raw {family} ICMP socket (requires root or CAP_NET_RAW)")]
    SocketOpen {
        family: AddressFamily,
        source: std::io::Error,
    },
}

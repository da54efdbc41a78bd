use std::net::IpAddr;

use itertools::Itertools;

use crate::error::ProbeError;
use crate::family::AddressFamily;

/// Hard upper bound for a batch, i.e. the number of targets sharing one socket and one
/// identifier/sequence pair.
pub const MAX_BATCH_SIZE: usize = 1024;

/// Ordered group of distinct addresses, probed together by one task.
/// The family of the first address decides the protocol for the whole batch.
#[derive(Debug, Clone)]
pub struct Batch {
    addresses: Vec<IpAddr>,
    family: AddressFamily,
}

impl Batch {
    pub fn new(addresses: Vec<IpAddr>) -> Result<Self, ProbeError> {
        let first = addresses.first().ok_or(ProbeError::EmptyBatch)?;
        if addresses.len() > MAX_BATCH_SIZE {
            return Err(ProbeError::BatchTooLarge {
                len: addresses.len(),
                max: MAX_BATCH_SIZE,
            });
        }
        if let Some(duplicate) = addresses.iter().duplicates().next() {
            return Err(ProbeError::DuplicateAddress(*duplicate));
        }
        let family = AddressFamily::of(first);
        Ok(Self { addresses, family })
    }

    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Addresses that can actually be reached through a socket of this batch's family.
    pub fn probeable(&self) -> impl Iterator<Item = &IpAddr> {
        self.addresses
            .iter()
            .filter(move |it| AddressFamily::of(it) == self.family)
    }
}

//! Finds out which of a list of addresses answer ICMP echo requests.
//!
//! A [Scanner] cuts the input into batches of at most [batch::MAX_BATCH_SIZE] addresses and
//! hands each one to a [ProbeTask], which owns one raw socket and one probe identifier for
//! its whole lifetime. Results come back per batch, aligned with the input order.

pub mod batch;
pub mod config;
pub mod error;
pub mod family;
pub mod packet;
pub mod scan;
pub mod socket;
pub mod task;

#[cfg(test)]
mod test_utils;

pub use crate::batch::Batch;
pub use crate::config::{ProbeConfig, ProbeTiming};
pub use crate::error::ProbeError;
pub use crate::family::AddressFamily;
pub use crate::scan::{BatchFailure, BatchReachability, ScanReport, ScanStreams, Scanner};
pub use crate::task::ProbeTask;

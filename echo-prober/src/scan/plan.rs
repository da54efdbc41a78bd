use std::ops::Range;
use std::time::Duration;

use crate::batch::MAX_BATCH_SIZE;
use crate::config::ProbeConfig;

/// A slice of the scan input together with the deadline its task gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedBatch {
    pub range: Range<usize>,
    pub timeout: Duration,
}

/// Cuts `total` addresses into consecutive batches. A full batch always gets the long timeout.
/// Whatever is left after the full batches is judged by its own size: small remainders get
/// the short timeout, larger ones the long one.
pub fn plan_batches(total: usize, config: &ProbeConfig) -> Vec<PlannedBatch> {
    let cap = config.max_batch_size.clamp(1, MAX_BATCH_SIZE);
    let mut planned = vec![];
    let mut offset = 0;
    while offset < total {
        let remaining = total - offset;
        let (len, timeout) = if remaining >= cap {
            (cap, config.long_timeout)
        } else if remaining <= config.small_scan_threshold {
            (remaining, config.short_timeout)
        } else {
            (remaining, config.long_timeout)
        };
        planned.push(PlannedBatch {
            range: offset..offset + len,
            timeout,
        });
        offset += len;
    }
    planned
}

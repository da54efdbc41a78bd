use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::batch::Batch;
use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::socket::{RawSocketOpener, SocketOpener};
use crate::task::ProbeTask;

pub use self::plan::{plan_batches, PlannedBatch};

mod plan;

/// Probe identifiers stay below this value and wrap to zero when they reach it.
pub const IDENTIFIER_CEILING: u16 = 1 << 15;

/// Reachability of one batch. `offset` is the position of its first address in the scan input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReachability {
    pub offset: usize,
    pub reachable: Vec<bool>,
}

/// A batch that could not be probed at all, e.g. because its socket could not be opened.
#[derive(Debug)]
pub struct BatchFailure {
    pub offset: usize,
    pub len: usize,
    pub error: ProbeError,
}

/// The two outputs of a running scan. Both close once the last batch is through.
pub struct ScanStreams {
    pub results: UnboundedReceiver<BatchReachability>,
    pub failures: UnboundedReceiver<BatchFailure>,
}

/// Outcome of [Scanner::scan_collect], aligned with the scan input.
/// Addresses of failed batches are reported unreachable.
#[derive(Debug)]
pub struct ScanReport {
    pub reachable: Vec<bool>,
    pub failures: Vec<BatchFailure>,
}

impl ScanReport {
    pub fn reachable_count(&self) -> usize {
        self.reachable.iter().filter(|it| **it).count()
    }
}

pub struct Scanner {
    config: ProbeConfig,
    opener: Arc<dyn SocketOpener>,
    next_identifier: u16,
}

impl Scanner {
    pub fn new(config: ProbeConfig) -> Self {
        Self::with_opener(config, Arc::new(RawSocketOpener))
    }

    pub fn with_opener(config: ProbeConfig, opener: Arc<dyn SocketOpener>) -> Self {
        Self {
            config,
            opener,
            next_identifier: 0,
        }
    }

    /// Continues identifier allocation at `identifier`, taken modulo [IDENTIFIER_CEILING].
    pub fn starting_at(mut self, identifier: u16) -> Self {
        self.next_identifier = identifier % IDENTIFIER_CEILING;
        self
    }

    pub fn next_identifier(&self) -> u16 {
        self.next_identifier
    }

    fn allocate_identifier(&mut self) -> u16 {
        let allocated = self.next_identifier;
        self.next_identifier = (allocated + 1) % IDENTIFIER_CEILING;
        allocated
    }

    /// Starts probing `addresses` in the background. Batches run one after the other and
    /// each one is reported on exactly one of the returned streams as soon as it is through.
    pub fn scan(&mut self, addresses: Vec<IpAddr>) -> ScanStreams {
        let planned = plan_batches(addresses.len(), &self.config)
            .into_iter()
            .map(|batch| (self.allocate_identifier(), batch))
            .collect::<Vec<_>>();
        let (results_tx, results) = mpsc::unbounded_channel();
        let (failures_tx, failures) = mpsc::unbounded_channel();

        let run = ScanRun {
            config: self.config.clone(),
            opener: self.opener.clone(),
            results_tx,
            failures_tx,
        };
        tokio::spawn(run.execute(addresses, planned));

        ScanStreams { results, failures }
    }

    /// Probes `addresses` and waits for every batch to finish.
    pub async fn scan_collect(&mut self, addresses: Vec<IpAddr>) -> ScanReport {
        let mut reachable = vec![false; addresses.len()];
        let ScanStreams {
            mut results,
            mut failures,
        } = self.scan(addresses);

        while let Some(batch) = results.recv().await {
            let end = batch.offset + batch.reachable.len();
            reachable[batch.offset..end].copy_from_slice(&batch.reachable);
        }
        let mut collected_failures = vec![];
        while let Some(failure) = failures.recv().await {
            collected_failures.push(failure);
        }

        ScanReport {
            reachable,
            failures: collected_failures,
        }
    }
}

struct ScanRun {
    config: ProbeConfig,
    opener: Arc<dyn SocketOpener>,
    results_tx: UnboundedSender<BatchReachability>,
    failures_tx: UnboundedSender<BatchFailure>,
}

impl ScanRun {
    async fn execute(self, mut addresses: Vec<IpAddr>, planned: Vec<(u16, PlannedBatch)>) {
        let total = addresses.len();
        let batch_count = planned.len();
        let mut failed = 0usize;

        for (identifier, PlannedBatch { range, timeout }) in planned {
            if self.results_tx.is_closed() && self.failures_tx.is_closed() {
                debug!(
                    "Nobody is listening anymore, abandoning scan at offset {} of {}",
                    range.start, total
                );
                return;
            }

            let offset = range.start;
            let len = range.len();
            // Ranges are consecutive, so the next batch always sits at the front.
            let chunk = addresses.drain(..len).collect::<Vec<_>>();

            let task = Batch::new(chunk).and_then(|batch| {
                ProbeTask::new(batch, identifier, self.opener.as_ref(), &self.config.timing)
            });
            match task {
                Ok(task) => {
                    trace!(
                        "Probing {} addresses at offset {} as {}/{} with {:?} timeout",
                        len,
                        offset,
                        task.identifier(),
                        task.sequence(),
                        timeout
                    );
                    let reachable = task.run(timeout).await;
                    let _ = self.results_tx.send(BatchReachability { offset, reachable });
                }
                Err(error) => {
                    warn!("Batch at offset {} ({} addresses) failed: {}", offset, len, error);
                    failed += 1;
                    let _ = self.failures_tx.send(BatchFailure { offset, len, error });
                }
            }
        }

        if batch_count > 0 {
            info!(
                "Scan of {} addresses done: {} batches, {} failed",
                total, batch_count, failed
            );
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::batch::Batch;
use crate::config::ProbeTiming;
use crate::error::ProbeError;
use crate::socket::{EchoSocket, SocketOpener};

use self::receiver::{ReceiveStats, ReceiveWorker};
use self::sender::SendWorker;

mod receiver;
mod sender;

/// Probes one batch through one socket. Lives for exactly one [ProbeTask::run], which closes
/// the socket on the way out, whether every address answered or the deadline hit.
pub struct ProbeTask {
    batch: Batch,
    identifier: u16,
    sequence: u16,
    socket: Arc<dyn EchoSocket>,
    timing: ProbeTiming,
}

impl ProbeTask {
    pub fn new(
        batch: Batch,
        identifier: u16,
        opener: &dyn SocketOpener,
        timing: &ProbeTiming,
    ) -> Result<Self, ProbeError> {
        let family = batch.family();
        let socket = opener
            .open(family, timing.read_deadline)
            .map_err(|source| ProbeError::SocketOpen { family, source })?;

        let foreign = batch.len() - batch.probeable().count();
        if foreign > 0 {
            warn!(
                "{} of {} addresses in probe {} are not {} like the first one; \
                they cannot be probed with this socket and will be reported unreachable",
                foreign,
                batch.len(),
                identifier,
                family
            );
        }

        Ok(Self {
            batch,
            identifier,
            sequence: rand::random(),
            socket,
            timing: timing.clone(),
        })
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Probes until every address answered or `timeout` passed, and returns one entry
    /// per batch address, in batch order. `false` only means no answer arrived in time.
    pub async fn run(self, timeout: Duration) -> Vec<bool> {
        let Self {
            batch,
            identifier,
            sequence,
            socket,
            timing,
        } = self;
        let family = batch.family();
        let stop = CancellationToken::new();
        let done = CancellationToken::new();
        let (confirmed_tx, confirmed_rx) = mpsc::channel(1);

        let deadline = tokio::spawn(expire_after(timeout, stop.clone()));

        let receive_worker = ReceiveWorker {
            socket: socket.clone(),
            family,
            identifier,
            sequence,
            handoff_interval: timing.handoff_interval,
            read_deadline: timing.read_deadline,
            stop: stop.clone(),
            done: done.clone(),
            confirmed_tx,
        };
        let receive_handle = tokio::task::spawn_blocking(move || receive_worker.run());

        let send_worker = SendWorker {
            socket,
            family,
            identifier,
            sequence,
            max_rounds: timing.send_rounds,
            pending: batch.probeable().copied().collect(),
            stop,
            done,
            confirmed_rx,
        };
        let outcome = send_worker.run().await;

        let receive_stats = receive_handle.await.unwrap_or_else(|e| {
            warn!("Receiver of probe {} did not finish cleanly: {}", identifier, e);
            ReceiveStats::default()
        });
        deadline.abort();

        debug!(
            "Probe {} ({} {} targets, seq {}) done: {} reachable, {} rounds, {} sent, \
            {} send failures, {} replies accepted, {} ignored, {} read errors, {} handoffs",
            identifier,
            batch.len(),
            family,
            sequence,
            outcome.reachable.len(),
            outcome.rounds,
            outcome.sent,
            outcome.send_failures,
            receive_stats.accepted,
            receive_stats.rejected,
            receive_stats.read_errors,
            receive_stats.handoffs,
        );

        batch
            .addresses()
            .iter()
            .map(|it| outcome.reachable.contains(it))
            .collect()
    }
}

async fn expire_after(timeout: Duration, stop: CancellationToken) {
    tokio::time::sleep(timeout).await;
    stop.cancel();
}

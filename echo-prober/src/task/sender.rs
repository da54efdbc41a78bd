use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::family::AddressFamily;
use crate::packet::EchoRequest;
use crate::socket::EchoSocket;

/// Sends echo request rounds to everything still pending and books confirmations coming
/// from the receiver. Sole owner of the pending and reachable sets.
pub(super) struct SendWorker {
    pub socket: Arc<dyn EchoSocket>,
    pub family: AddressFamily,
    pub identifier: u16,
    pub sequence: u16,
    pub max_rounds: u8,
    pub pending: HashSet<IpAddr>,
    pub stop: CancellationToken,
    pub done: CancellationToken,
    pub confirmed_rx: mpsc::Receiver<Vec<IpAddr>>,
}

#[derive(Debug, Default)]
pub(super) struct SendOutcome {
    pub reachable: HashSet<IpAddr>,
    pub rounds: u8,
    pub sent: usize,
    pub send_failures: usize,
}

impl SendWorker {
    pub async fn run(mut self) -> SendOutcome {
        let mut outcome = SendOutcome::default();
        loop {
            if outcome.rounds < self.max_rounds {
                self.send_round(&mut outcome);
                outcome.rounds += 1;
            }

            select! {
                biased; // Stop should take prio
                _ = self.stop.cancelled() => {
                    trace!("Deadline reached with {} addresses pending", self.pending.len());
                    return outcome;
                }
                delivery = self.confirmed_rx.recv() => match delivery {
                    Some(confirmed) => {
                        self.book(confirmed, &mut outcome.reachable);
                        if self.pending.is_empty() {
                            trace!("All addresses confirmed after {} rounds", outcome.rounds);
                            self.done.cancel();
                            return outcome;
                        }
                    }
                    None => {
                        debug!("Receiver went away early, waiting out the deadline");
                        self.stop.cancelled().await;
                        return outcome;
                    }
                },
            }
        }
    }

    fn send_round(&self, outcome: &mut SendOutcome) {
        let request = EchoRequest::stamped_now(self.identifier, self.sequence);
        let packet = match request.encode(self.family) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Unable to build echo request for probe {}: {}", self.identifier, e);
                return;
            }
        };
        for target in self.pending.iter() {
            match self.socket.send_to(&packet, *target) {
                Ok(_) => outcome.sent += 1,
                Err(e) => {
                    outcome.send_failures += 1;
                    debug!("Failed to send echo request to {}: {}", target, e);
                }
            }
        }
    }

    fn book(&mut self, confirmed: Vec<IpAddr>, reachable: &mut HashSet<IpAddr>) {
        for addr in confirmed {
            if self.pending.remove(&addr) {
                reachable.insert(addr);
            }
        }
    }
}

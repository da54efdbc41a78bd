use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::family::AddressFamily;
use crate::packet::EchoReply;
use crate::socket::EchoSocket;

/// Large enough for any echo reply we care about, including a maximal IPv4 header.
const RECV_BUF_LEN: usize = 1500;

/// Blocking read loop collecting the sources of matching echo replies, handing them to
/// the sender once per handoff interval.
pub(super) struct ReceiveWorker {
    pub socket: Arc<dyn EchoSocket>,
    pub family: AddressFamily,
    pub identifier: u16,
    pub sequence: u16,
    pub handoff_interval: Duration,
    pub read_deadline: Duration,
    pub stop: CancellationToken,
    pub done: CancellationToken,
    pub confirmed_tx: mpsc::Sender<Vec<IpAddr>>,
}

#[derive(Debug, Default)]
pub(super) struct ReceiveStats {
    pub accepted: usize,
    pub rejected: usize,
    pub read_errors: usize,
    pub handoffs: usize,
}

impl ReceiveWorker {
    pub fn run(self) -> ReceiveStats {
        let mut stats = ReceiveStats::default();
        let mut accumulated: Vec<IpAddr> = vec![];
        let mut last_handoff = Instant::now();
        let mut buf = [0u8; RECV_BUF_LEN];

        while !self.stop.is_cancelled() && !self.done.is_cancelled() {
            if last_handoff.elapsed() >= self.handoff_interval {
                last_handoff = Instant::now();
                match self.confirmed_tx.try_send(std::mem::take(&mut accumulated)) {
                    Ok(()) => stats.handoffs += 1,
                    Err(TrySendError::Full(returned)) => {
                        trace!("Sender busy, keeping {} confirmations for later", returned.len());
                        accumulated = returned;
                    }
                    Err(TrySendError::Closed(_)) => {
                        trace!("Sender is gone, receiver exiting");
                        break;
                    }
                }
                continue;
            }

            match self.socket.recv_from(&mut buf) {
                Ok(Some((len, source))) => {
                    if self.is_our_reply(&buf[..len], source) {
                        stats.accepted += 1;
                        accumulated.push(source);
                    } else {
                        stats.rejected += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    stats.read_errors += 1;
                    debug!("Failed to read from ICMP socket: {}", e);
                    std::thread::sleep(self.read_deadline);
                }
            }
        }
        stats
    }

    fn is_our_reply(&self, datagram: &[u8], source: IpAddr) -> bool {
        match EchoReply::decode(self.family, datagram) {
            Ok(reply) if reply.answers(self.identifier, self.sequence) => {
                if let Some(rtt) = reply.round_trip() {
                    trace!("Echo reply from {} after {:?}", source, rtt);
                }
                true
            }
            Ok(reply) => {
                trace!(
                    "Ignoring echo reply from {} for {}/{}",
                    source,
                    reply.identifier,
                    reply.sequence
                );
                false
            }
            Err(e) => {
                trace!("Ignoring ICMP message from {}: {}", source, e);
                false
            }
        }
    }
}

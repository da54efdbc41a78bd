use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{EchoSocket, SocketOpener};
use crate::family::AddressFamily;
use crate::test_utils::{addrs, reply_to};

/// Ways a fake network mangles its answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tamper {
    Honest,
    WrongIdentifier,
    WrongSequence,
    /// Valid answers, but they come from an address that was never probed.
    FromStranger(IpAddr),
}

/// In-memory network: every responsive address answers each echo request it receives.
#[derive(Clone)]
pub struct FakeOpener {
    responsive: HashSet<IpAddr>,
    tamper: Tamper,
    answer_from_attempt: usize,
    failing_family: Option<AddressFamily>,
    opened: Arc<Mutex<Vec<Arc<FakeEchoSocket>>>>,
    open_now: Arc<AtomicUsize>,
    open_at_most: Arc<AtomicUsize>,
}

impl FakeOpener {
    pub fn answering(responsive: &[&str]) -> Self {
        Self {
            responsive: addrs(responsive).into_iter().collect(),
            tamper: Tamper::Honest,
            answer_from_attempt: 1,
            failing_family: None,
            opened: Arc::new(Mutex::new(vec![])),
            open_now: Arc::new(AtomicUsize::new(0)),
            open_at_most: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_tamper(mut self, tamper: Tamper) -> Self {
        self.tamper = tamper;
        self
    }

    /// Responsive hosts ignore the first `attempt - 1` requests.
    pub fn answering_from_attempt(mut self, attempt: usize) -> Self {
        self.answer_from_attempt = attempt;
        self
    }

    pub fn failing_for(mut self, family: AddressFamily) -> Self {
        self.failing_family = Some(family);
        self
    }

    pub fn opened(&self) -> Vec<Arc<FakeEchoSocket>> {
        self.opened.lock().expect("opened lock").clone()
    }

    /// Sockets handed out and not yet dropped by their task.
    pub fn open_now(&self) -> usize {
        self.open_now.load(Ordering::SeqCst)
    }

    pub fn open_at_most(&self) -> usize {
        self.open_at_most.load(Ordering::SeqCst)
    }
}

impl SocketOpener for FakeOpener {
    fn open(&self, family: AddressFamily, read_deadline: Duration) -> io::Result<Arc<dyn EchoSocket>> {
        if self.failing_family == Some(family) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "no raw sockets for you"));
        }
        let socket = Arc::new(FakeEchoSocket {
            family,
            read_deadline,
            responsive: self.responsive.clone(),
            tamper: self.tamper,
            answer_from_attempt: self.answer_from_attempt,
            attempts: Mutex::new(HashMap::new()),
            inbox: Mutex::new(VecDeque::new()),
        });
        self.opened.lock().expect("opened lock").push(socket.clone());
        let open = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.open_at_most.fetch_max(open, Ordering::SeqCst);
        Ok(Arc::new(LeasedSocket {
            inner: socket,
            open_now: self.open_now.clone(),
        }))
    }
}

/// What a task actually holds. Dropping the last clone counts as closing the socket.
struct LeasedSocket {
    inner: Arc<FakeEchoSocket>,
    open_now: Arc<AtomicUsize>,
}

impl Drop for LeasedSocket {
    fn drop(&mut self) {
        self.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EchoSocket for LeasedSocket {
    fn send_to(&self, packet: &[u8], target: IpAddr) -> io::Result<usize> {
        self.inner.send_to(packet, target)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, IpAddr)>> {
        self.inner.recv_from(buf)
    }
}

pub struct FakeEchoSocket {
    family: AddressFamily,
    read_deadline: Duration,
    responsive: HashSet<IpAddr>,
    tamper: Tamper,
    answer_from_attempt: usize,
    attempts: Mutex<HashMap<IpAddr, usize>>,
    inbox: Mutex<VecDeque<(Vec<u8>, IpAddr)>>,
}

impl FakeEchoSocket {
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn attempts_to(&self, target: IpAddr) -> usize {
        let attempts = self.attempts.lock().expect("attempts lock");
        attempts.get(&target).copied().unwrap_or_default()
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().expect("attempts lock").values().sum()
    }

    fn answer(&self, packet: &[u8], target: IpAddr) -> (Vec<u8>, IpAddr) {
        let mut request = packet.to_vec();
        let mut source = target;
        match self.tamper {
            Tamper::Honest => {}
            Tamper::WrongIdentifier => request[4] ^= 0xff,
            Tamper::WrongSequence => request[7] ^= 0xff,
            Tamper::FromStranger(stranger) => source = stranger,
        }
        (reply_to(self.family, &request), source)
    }
}

impl EchoSocket for FakeEchoSocket {
    fn send_to(&self, packet: &[u8], target: IpAddr) -> io::Result<usize> {
        if AddressFamily::of(&target) != self.family {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "wrong address family"));
        }
        let attempt = {
            let mut attempts = self.attempts.lock().expect("attempts lock");
            let count = attempts.entry(target).or_default();
            *count += 1;
            *count
        };
        if self.responsive.contains(&target) && attempt >= self.answer_from_attempt {
            let answer = self.answer(packet, target);
            self.inbox.lock().expect("inbox lock").push_back(answer);
        }
        Ok(packet.len())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, IpAddr)>> {
        let next = self.inbox.lock().expect("inbox lock").pop_front();
        match next {
            Some((datagram, source)) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(Some((len, source)))
            }
            None => {
                std::thread::sleep(self.read_deadline);
                Ok(None)
            }
        }
    }
}

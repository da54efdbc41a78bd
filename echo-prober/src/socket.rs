use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use log::trace;
use socket2::{Domain, Protocol, Socket, Type};

use crate::family::AddressFamily;

#[cfg(test)]
pub mod fake;

/// ICMP socket as seen by a probe task. Writes come from the sender, reads from the receiver,
/// so implementations must allow both concurrently through a shared reference.
pub trait EchoSocket: Send + Sync {
    fn send_to(&self, packet: &[u8], target: IpAddr) -> io::Result<usize>;

    /// Reads one datagram, waiting no longer than the read deadline the socket was opened with.
    /// Returns `Ok(None)` if nothing arrived in time.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, IpAddr)>>;
}

/// Opens one socket per probe task.
pub trait SocketOpener: Send + Sync {
    fn open(&self, family: AddressFamily, read_deadline: Duration) -> io::Result<Arc<dyn EchoSocket>>;
}

/// Opens raw ICMP sockets. Needs root or CAP_NET_RAW.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawSocketOpener;

impl SocketOpener for RawSocketOpener {
    fn open(&self, family: AddressFamily, read_deadline: Duration) -> io::Result<Arc<dyn EchoSocket>> {
        let (domain, protocol) = match family {
            AddressFamily::V4 => (Domain::IPV4, Protocol::ICMPV4),
            AddressFamily::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };
        let socket = Socket::new(domain, Type::RAW, Some(protocol))?;
        socket.set_read_timeout(Some(read_deadline))?;
        trace!("Opened raw {} ICMP socket", family);
        // Raw sockets speak the same sendto/recvfrom calls as datagram sockets.
        let inner = UdpSocket::from(socket);
        Ok(Arc::new(RawEchoSocket { inner }))
    }
}

struct RawEchoSocket {
    inner: UdpSocket,
}

impl EchoSocket for RawEchoSocket {
    fn send_to(&self, packet: &[u8], target: IpAddr) -> io::Result<usize> {
        self.inner.send_to(packet, SocketAddr::new(target, 0))
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, IpAddr)>> {
        match self.inner.recv_from(buf) {
            Ok((len, from)) => Ok(Some((len, from.ip()))),
            Err(e) if is_deadline(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn is_deadline(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

//! The socket-provider boundary the engine is driven through.
//!
//! Binding to a real OS socket, reporting the last OS error, and retrieving
//! the bound local address are all platform concerns the core deliberately
//! leaves to an external collaborator; this trait is the seam. A concrete
//! `std::net::UdpSocket` adapter lives in the outermost binary crate. The
//! in-memory bus below lives here so every engine test can script
//! multi-node scenarios deterministically, without touching a real socket.

use codec::NetAddress;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex};

/// Non-blocking UDP send/receive, abstracted so the engine never touches
/// `std::net` directly.
pub trait UdpTransport {
    /// Sends `bytes` to `dest`. Socket-layer failures are swallowed per the
    /// protocol's error-handling policy (§7): the caller never retries a
    /// send directly, the resend timer re-drives it.
    fn send_to(&mut self, bytes: &[u8], dest: NetAddress);

    /// Non-blocking receive. Returns `None` if nothing is queued.
    fn recv_from(&mut self) -> Option<(Vec<u8>, NetAddress)>;

    /// The address this endpoint is bound to.
    fn local_addr(&self) -> NetAddress;

    /// Human-readable description of the last OS-level error, if any.
    fn last_error(&self) -> Option<String> {
        None
    }
}

pub fn net_to_socket_addr(addr: NetAddress) -> SocketAddrV4 {
    SocketAddrV4::new(addr.ip(), addr.port)
}

#[derive(Default)]
struct Bus {
    queues: HashMap<NetAddress, VecDeque<(Vec<u8>, NetAddress)>>,
}

/// A shared, in-process stand-in for a UDP fabric: every endpoint created
/// from the same network delivers into and drains from one common set of
/// per-address queues, letting tests script a master and several ordinary
/// nodes exchanging real encoded frames without a real socket anywhere.
/// `Send` so a scripted peer (e.g. a mock STUN server) can run on its own
/// thread while the code under test blocks on a reply.
#[derive(Clone, Default)]
pub struct InMemoryNetwork(Arc<Mutex<Bus>>);

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an endpoint bound to `addr` on this network.
    pub fn endpoint(&self, addr: NetAddress) -> InMemoryTransport {
        self.0.lock().unwrap().queues.entry(addr).or_default();
        InMemoryTransport {
            local: addr,
            bus: self.0.clone(),
        }
    }
}

pub struct InMemoryTransport {
    local: NetAddress,
    bus: Arc<Mutex<Bus>>,
}

impl UdpTransport for InMemoryTransport {
    fn send_to(&mut self, bytes: &[u8], dest: NetAddress) {
        self.bus
            .lock()
            .unwrap()
            .queues
            .entry(dest)
            .or_default()
            .push_back((bytes.to_vec(), self.local));
    }

    fn recv_from(&mut self) -> Option<(Vec<u8>, NetAddress)> {
        self.bus
            .lock()
            .unwrap()
            .queues
            .get_mut(&self.local)
            .and_then(|q| q.pop_front())
    }

    fn local_addr(&self) -> NetAddress {
        self.local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagrams_route_only_to_their_destination() {
        let net = InMemoryNetwork::new();
        let a = NetAddress::ipv4(127, 0, 0, 1, 1);
        let b = NetAddress::ipv4(127, 0, 0, 1, 2);

        let mut ta = net.endpoint(a);
        let mut tb = net.endpoint(b);

        ta.send_to(b"hello", b);
        assert_eq!(ta.recv_from(), None);

        let (bytes, src) = tb.recv_from().unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(src, a);
    }
}

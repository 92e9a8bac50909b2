//! Host state machine (C5): the master/ordinary rendezvous protocol.
//!
//! Single-threaded, driven by repeated calls to [`Host::update`] from a
//! network loop. Each call drains at most one datagram, dispatches it by
//! message id, ticks the hole puncher, then checks the connect-phase retry
//! timer. All protocol state transitions happen on this one thread; nothing
//! here ever blocks.

use crate::peer::{ADDR_GRAY, ADDR_HOST, ADDR_WHITE, Peer, PeerInfo, PeerStatus};
use crate::pool::Pool;
use crate::puncher::HolePuncher;
use crate::transport::UdpTransport;
use codec::message::{
    HostMessage, MsgId, NICKNAME_LEN, RejectReason, RequestBody, ResponseFragment, decode_nickname,
    encode_nickname,
};
use codec::{Handle, NetAddress};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

const CONNECT_INIT_TIMEOUT_MS: u64 = 1000;
const CONNECT_RETRY_TIMEOUT_MS: u64 = 1000;
const CONNECT_MAX_RETRIES: u32 = 5;

/// User-visible reasons a `connect()` can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailReason {
    InitiateConnectionTimeout,
    ConnectionResponseTimeout,
    ConnectionNotMaster,
    CorruptedChannel,
}

/// The connection protocol's state. A master node is always [`HostState::Idle`];
/// an ordinary node starts at [`HostState::NotConnected`] and either reaches
/// `Idle` (fully joined) or falls back to `NotConnected` on any failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostState {
    Idle,
    NotConnected,
    WaitResponse {
        address: NetAddress,
        fail_reason: ConnectFailReason,
        deadline: Instant,
        retries: u32,
    },
    WaitClients {
        count: usize,
    },
}

/// Hooks for delivery of peer lifecycle and (eventually) payload events.
///
/// Default bodies are empty: the host wires peer connect/disconnect
/// transitions through here, but `on_message_received` has nothing to
/// drive it yet since [`Host::send`] is a stub — payload transport is a
/// non-goal of this engine.
pub trait PeerObserver {
    #[allow(unused_variables)]
    fn on_peer_connected(&mut self, handle: Handle, info: &PeerInfo) {}
    #[allow(unused_variables)]
    fn on_peer_disconnected(&mut self, handle: Handle) {}
    #[allow(unused_variables)]
    fn on_message_received(&mut self, handle: Handle, bytes: &[u8]) {}
}

/// A one-shot outcome produced by a hole-puncher callback, queued rather
/// than acted on immediately so the callback itself never needs a second
/// `&mut Host` borrow while the puncher call that invoked it is still on
/// the stack.
enum PunchOutcome {
    /// The initial connect punch to the master resolved.
    MasterResponded { peer: Handle, address: NetAddress },
    /// A roster peer from `Response` resolved; send it a `Join`.
    JoinTarget { peer: Handle, address: NetAddress },
    /// A `PingA`-triggered pinhole punch resolved; nothing to do but let
    /// the caller remove the pending entry.
    PinholeOnly { peer: Handle },
}

#[derive(Clone, Copy)]
enum TimerAction {
    Retry(NetAddress),
    Fail(ConnectFailReason),
}

/// The master/ordinary rendezvous protocol, driven from a single network
/// thread and shared UDP endpoint.
pub struct Host<T: UdpTransport> {
    transport: T,
    is_master: bool,
    nickname: String,
    self_gray: NetAddress,
    self_white: NetAddress,
    state: HostState,
    peers: Pool<Peer>,
    puncher: HolePuncher,
    peers_info_changed: bool,
    connect_on_failed: Option<Box<dyn FnOnce(ConnectFailReason)>>,
    events: Rc<RefCell<VecDeque<PunchOutcome>>>,
    observer: Option<Box<dyn PeerObserver>>,
}

impl<T: UdpTransport> Host<T> {
    pub fn new(
        transport: T,
        is_master: bool,
        nickname: impl Into<String>,
        self_gray: NetAddress,
        self_white: NetAddress,
    ) -> Self {
        Self {
            transport,
            is_master,
            nickname: nickname.into(),
            self_gray,
            self_white,
            state: if is_master {
                HostState::Idle
            } else {
                HostState::NotConnected
            },
            peers: Pool::new(),
            puncher: HolePuncher::new(is_master),
            peers_info_changed: false,
            connect_on_failed: None,
            events: Rc::new(RefCell::new(VecDeque::new())),
            observer: None,
        }
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn state(&self) -> &HostState {
        &self.state
    }

    pub fn peer_count(&self) -> usize {
        self.peers.count()
    }

    pub fn set_observer(&mut self, observer: Box<dyn PeerObserver>) {
        self.observer = Some(observer);
    }

    /// Whether any peer has been added, removed, or changed status since
    /// the last `query_peer_infos` call.
    pub fn peers_info_changed(&self) -> bool {
        self.peers_info_changed
    }

    /// Delivers `(handle, PeerInfo)` for every peer with a non-empty
    /// nickname, and clears the changed flag.
    pub fn query_peer_infos(&mut self, mut callback: impl FnMut(Handle, PeerInfo)) {
        self.peers_info_changed = false;
        for (handle, peer) in self.peers.iter() {
            if peer.nickname.is_empty() {
                continue;
            }
            callback(
                handle,
                PeerInfo {
                    handle,
                    nickname: peer.nickname.clone(),
                    status: peer.status,
                },
            );
        }
    }

    /// Payload transport is a non-goal of the core; intentionally
    /// unimplemented rather than omitted, since `PeerObserver::on_message_received`
    /// exists for a future payload layer to deliver into.
    pub fn send(&mut self, _handle: Handle, _bytes: &[u8]) -> bool {
        false
    }

    /// Begins the ordinary-node connect flow against `candidates` (the
    /// master's gray and white address).
    pub fn connect(&mut self, candidates: [NetAddress; 2], on_failed: Box<dyn FnOnce(ConnectFailReason)>) {
        let peer = Peer::new(
            self.nickname.clone(),
            [NetAddress::any(0), candidates[0], candidates[1]],
        );
        let handle = self.peers.alloc(peer);
        self.peers_info_changed = true;
        self.connect_on_failed = Some(on_failed);
        self.state = HostState::NotConnected;

        let events = self.events.clone();
        self.puncher.add_remote_host(
            handle,
            vec![candidates[0], candidates[1]],
            Duration::from_millis(CONNECT_INIT_TIMEOUT_MS),
            Box::new(move |address| {
                events
                    .borrow_mut()
                    .push_back(PunchOutcome::MasterResponded { peer: handle, address });
            }),
        );
    }

    /// Drains exactly one datagram, ticks the puncher, and checks the
    /// connect-retry timer. Call repeatedly from the network loop.
    pub fn update(&mut self) {
        if let Some((bytes, src)) = self.transport.recv_from() {
            self.dispatch(src, &bytes);
        }

        self.puncher.update(&mut self.transport);
        self.drain_punch_outcomes();
        self.tick_timers();
    }

    fn dispatch(&mut self, src: NetAddress, bytes: &[u8]) {
        match HostMessage::decode(bytes) {
            Ok(message) => self.handle_message(src, message),
            Err(err) => {
                log::warn!("discarding malformed frame from {src}: {err}");
                // Protocol-mandated exception to "logged and dropped": a
                // Request that fails to parse still earns a reply, so a
                // confused ordinary node doesn't hang waiting for one. The
                // master/state gate takes priority over the format check,
                // same order as `on_request`: a non-master or busy node
                // replies NotMaster even to a malformed Request.
                if peek_msg_id(bytes) == Some(MsgId::Request) {
                    let reason = if !self.is_master || !matches!(self.state, HostState::Idle) {
                        RejectReason::NotMaster
                    } else {
                        RejectReason::InvalidMessageFormat
                    };
                    self.transport.send_to(&HostMessage::Reject(reason).encode(), src);
                }
            }
        }
    }

    fn handle_message(&mut self, src: NetAddress, message: HostMessage) {
        match message {
            HostMessage::Ping(handle) => self.puncher.on_ping_received(&mut self.transport, src, handle),
            HostMessage::Pong(handle) => self.puncher.on_pong_received(src, handle),
            HostMessage::Heartbeat => {}
            HostMessage::Request(body) => self.on_request(src, body),
            HostMessage::Reject(reason) => self.on_reject(reason),
            HostMessage::Response { nickname, fragments } => self.on_response(src, nickname, fragments),
            HostMessage::PingA(body) => self.on_ping_a(body),
            HostMessage::Join(nickname) => self.on_join(src, nickname),
            HostMessage::JoinOk => self.on_join_ok(src),
        }
    }

    fn drain_punch_outcomes(&mut self) {
        loop {
            let outcome = self.events.borrow_mut().pop_front();
            match outcome {
                Some(PunchOutcome::MasterResponded { peer, address }) => {
                    self.on_master_responded(peer, address)
                }
                Some(PunchOutcome::JoinTarget { peer, address }) => self.on_join_target(peer, address),
                Some(PunchOutcome::PinholeOnly { peer }) => self.puncher.del_remote_host(peer),
                None => break,
            }
        }
    }

    fn tick_timers(&mut self) {
        let action = match &mut self.state {
            HostState::WaitResponse {
                address,
                fail_reason,
                deadline,
                retries,
            } => {
                if Instant::now() < *deadline {
                    None
                } else if *retries < CONNECT_MAX_RETRIES {
                    *retries += 1;
                    *deadline = Instant::now() + Duration::from_millis(CONNECT_RETRY_TIMEOUT_MS);
                    Some(TimerAction::Retry(*address))
                } else {
                    Some(TimerAction::Fail(*fail_reason))
                }
            }
            _ => None,
        };

        match action {
            Some(TimerAction::Retry(address)) => self.send_request(address),
            Some(TimerAction::Fail(reason)) => self.fail_connection(reason),
            None => {}
        }
    }

    fn send_request(&mut self, to: NetAddress) {
        let body = RequestBody {
            gray: self.self_gray,
            white: self.self_white,
            nickname: encode_nickname(&self.nickname),
        };
        self.transport.send_to(&HostMessage::Request(body).encode(), to);
    }

    fn on_master_responded(&mut self, peer: Handle, working: NetAddress) {
        if let Some(p) = self.peers.get_mut(peer) {
            p.addresses[ADDR_HOST] = working;
        }

        self.state = HostState::WaitResponse {
            address: working,
            fail_reason: ConnectFailReason::ConnectionResponseTimeout,
            deadline: Instant::now() + Duration::from_millis(CONNECT_RETRY_TIMEOUT_MS),
            retries: 0,
        };

        self.send_request(working);
    }

    fn on_reject(&mut self, reason: RejectReason) {
        if !matches!(self.state, HostState::WaitResponse { .. }) {
            log::debug!("reject received outside WaitResponse, ignoring");
            return;
        }

        match reason {
            RejectReason::NotMaster => self.fail_connection(ConnectFailReason::ConnectionNotMaster),
            RejectReason::InvalidMessageFormat => {
                if let HostState::WaitResponse {
                    fail_reason,
                    deadline,
                    ..
                } = &mut self.state
                {
                    *fail_reason = ConnectFailReason::CorruptedChannel;
                    *deadline = Instant::now();
                }
            }
            RejectReason::AlreadyRegistered => {
                log::warn!("unexpected AlreadyRegistered reject during connect");
            }
        }
    }

    fn on_response(&mut self, src: NetAddress, nickname: [u8; NICKNAME_LEN], fragments: Vec<ResponseFragment>) {
        let expected = match &self.state {
            HostState::WaitResponse { address, .. } => *address,
            _ => {
                log::warn!("response received outside WaitResponse, discarding");
                return;
            }
        };

        if expected != src {
            log::debug!("response from unexpected address {src}, discarding");
            return;
        }

        if let Some(master_handle) = self.find_peer_by_host(src) {
            self.puncher.del_remote_host(master_handle);
            if let Some(peer) = self.peers.get_mut(master_handle) {
                peer.nickname = decode_nickname(&nickname);
                peer.status = PeerStatus::Connected;
            }
            self.peers_info_changed = true;
            self.notify_connected(master_handle);
        }

        self.state = HostState::WaitClients {
            count: fragments.len(),
        };

        if fragments.is_empty() {
            self.state = HostState::Idle;
        }

        for fragment in fragments {
            let peer_handle = self
                .peers
                .alloc(Peer::new(decode_nickname(&fragment.nickname), fragment.addresses));
            self.peers_info_changed = true;

            let candidates = vec![fragment.addresses[ADDR_GRAY], fragment.addresses[ADDR_WHITE]];
            let events = self.events.clone();
            self.puncher.add_remote_host(
                peer_handle,
                candidates,
                Duration::from_millis(CONNECT_INIT_TIMEOUT_MS),
                Box::new(move |address| {
                    events.borrow_mut().push_back(PunchOutcome::JoinTarget {
                        peer: peer_handle,
                        address,
                    });
                }),
            );
        }
    }

    fn on_join_target(&mut self, peer: Handle, address: NetAddress) {
        if let Some(p) = self.peers.get_mut(peer) {
            p.addresses[ADDR_HOST] = address;
        }

        self.transport
            .send_to(&HostMessage::Join(encode_nickname(&self.nickname)).encode(), address);

        if let HostState::WaitClients { count } = &mut self.state {
            if *count > 0 {
                *count -= 1;
            }
            if *count == 0 {
                self.state = HostState::Idle;
            }
        }
    }

    fn fail_connection(&mut self, reason: ConnectFailReason) {
        let handles: Vec<Handle> = self.peers.iter().map(|(h, _)| h).collect();
        for handle in handles {
            self.remove_peer(handle);
        }

        self.state = HostState::NotConnected;
        if let Some(callback) = self.connect_on_failed.take() {
            callback(reason);
        }
    }

    fn remove_peer(&mut self, handle: Handle) {
        self.puncher.del_remote_host(handle);
        if self.peers.dealloc(handle).is_some() {
            self.peers_info_changed = true;
            if let Some(observer) = self.observer.as_mut() {
                observer.on_peer_disconnected(handle);
            }
        }
    }

    /// Master-only: a new ordinary node's rendezvous request.
    fn on_request(&mut self, src: NetAddress, body: RequestBody) {
        if !self.is_master || !matches!(self.state, HostState::Idle) {
            self.transport
                .send_to(&HostMessage::Reject(RejectReason::NotMaster).encode(), src);
            return;
        }

        if let Some(existing) = self.find_peer_by_host(src) {
            self.remove_peer(existing);
        }

        let existing_handles: Vec<Handle> = self.peers.iter().map(|(h, _)| h).collect();
        let fragments: Vec<ResponseFragment> = self
            .peers
            .iter()
            .map(|(_, peer)| ResponseFragment {
                addresses: peer.addresses,
                nickname: encode_nickname(&peer.nickname),
            })
            .collect();

        let joiner_handle = self.peers.alloc(Peer {
            nickname: decode_nickname(&body.nickname),
            addresses: [src, body.gray, body.white],
            status: PeerStatus::Connected,
        });
        self.peers_info_changed = true;
        self.notify_connected(joiner_handle);

        let ping_a = HostMessage::PingA(RequestBody {
            gray: body.gray,
            white: body.white,
            nickname: body.nickname,
        })
        .encode();
        for existing_handle in existing_handles {
            if let Some(existing_peer) = self.peers.get(existing_handle) {
                self.transport.send_to(&ping_a, existing_peer.host_address());
            }
        }

        let response = HostMessage::Response {
            nickname: encode_nickname(&self.nickname),
            fragments,
        };
        self.transport.send_to(&response.encode(), src);
    }

    /// Shared by master and ordinary nodes: a peer's gray/white addresses
    /// relayed by the master so the receiver opens a pinhole toward it.
    fn on_ping_a(&mut self, body: RequestBody) {
        let handle = self.peers.alloc(Peer::new(
            decode_nickname(&body.nickname),
            [NetAddress::any(0), body.gray, body.white],
        ));
        self.peers_info_changed = true;

        let events = self.events.clone();
        self.puncher.add_remote_host(
            handle,
            vec![body.gray, body.white],
            Duration::from_millis(CONNECT_INIT_TIMEOUT_MS),
            Box::new(move |_address| {
                events.borrow_mut().push_back(PunchOutcome::PinholeOnly { peer: handle });
            }),
        );
    }

    /// Shared: either side of a punched peer-to-peer link sends `Join`
    /// once its own punch resolves; the receiver confirms with `JoinOk`.
    fn on_join(&mut self, src: NetAddress, nickname: [u8; NICKNAME_LEN]) {
        let handle = self.find_peer_by_any_address(src).unwrap_or_else(|| {
            let h = self
                .peers
                .alloc(Peer::new(String::new(), [src, NetAddress::any(0), NetAddress::any(0)]));
            self.peers_info_changed = true;
            h
        });

        if let Some(peer) = self.peers.get_mut(handle) {
            peer.nickname = decode_nickname(&nickname);
            peer.status = PeerStatus::Connected;
        }
        self.peers_info_changed = true;
        self.notify_connected(handle);

        self.transport.send_to(&HostMessage::JoinOk.encode(), src);
    }

    fn on_join_ok(&mut self, src: NetAddress) {
        let Some(handle) = self.find_peer_by_any_address(src) else {
            log::debug!("join-ok from unrecognized peer {src}");
            return;
        };

        self.puncher.del_remote_host(handle);
        if let Some(peer) = self.peers.get_mut(handle) {
            peer.status = PeerStatus::Connected;
        }
        self.peers_info_changed = true;
        self.notify_connected(handle);
    }

    fn find_peer_by_host(&self, addr: NetAddress) -> Option<Handle> {
        self.peers
            .iter()
            .find(|(_, peer)| peer.host_address() == addr)
            .map(|(h, _)| h)
    }

    fn find_peer_by_any_address(&self, addr: NetAddress) -> Option<Handle> {
        self.peers
            .iter()
            .find(|(_, peer)| peer.addresses.contains(&addr))
            .map(|(h, _)| h)
    }

    fn notify_connected(&mut self, handle: Handle) {
        if let Some(peer) = self.peers.get(handle) {
            let info = PeerInfo {
                handle,
                nickname: peer.nickname.clone(),
                status: peer.status,
            };
            if let Some(observer) = self.observer.as_mut() {
                observer.on_peer_connected(handle, &info);
            }
        }
    }
}

fn peek_msg_id(bytes: &[u8]) -> Option<MsgId> {
    if bytes.len() < 2 {
        return None;
    }
    MsgId::try_from(u16::from_be_bytes([bytes[0], bytes[1]])).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryNetwork;

    fn run_until<T: UdpTransport>(host: &mut Host<T>, iterations: usize, mut stop: impl FnMut(&Host<T>) -> bool) {
        for _ in 0..iterations {
            if stop(host) {
                return;
            }
            host.update();
        }
    }

    #[test]
    fn two_node_rendezvous_connects_both_sides() {
        let net = InMemoryNetwork::new();
        let master_addr = NetAddress::ipv4(127, 0, 0, 1, 48800);
        let ordinary_addr = NetAddress::ipv4(127, 0, 0, 1, 48801);

        let mut master = Host::new(
            net.endpoint(master_addr),
            true,
            "master",
            master_addr,
            master_addr,
        );
        let mut ordinary = Host::new(
            net.endpoint(ordinary_addr),
            false,
            "alice",
            ordinary_addr,
            ordinary_addr,
        );

        ordinary.connect([master_addr, master_addr], Box::new(|_reason| {
            panic!("connect should not fail in this scenario");
        }));

        for _ in 0..50 {
            master.update();
            ordinary.update();
            if matches!(ordinary.state(), HostState::Idle) {
                break;
            }
        }

        assert!(matches!(ordinary.state(), HostState::Idle));
        assert_eq!(master.peer_count(), 1);
        assert_eq!(ordinary.peer_count(), 1);

        let mut found_alice = false;
        master.query_peer_infos(|_h, info| {
            if info.nickname == "alice" {
                assert_eq!(info.status, PeerStatus::Connected);
                found_alice = true;
            }
        });
        assert!(found_alice);
    }

    #[test]
    fn reject_not_master_fails_connect() {
        let net = InMemoryNetwork::new();
        let a_addr = NetAddress::ipv4(127, 0, 0, 1, 1);
        let b_addr = NetAddress::ipv4(127, 0, 0, 1, 2);

        let mut a = Host::new(net.endpoint(a_addr), false, "a", a_addr, a_addr);
        let mut b = Host::new(net.endpoint(b_addr), false, "b", b_addr, b_addr);

        let failed = Rc::new(RefCell::new(None));
        let failed_ = failed.clone();
        a.connect(
            [b_addr, b_addr],
            Box::new(move |reason| {
                *failed_.borrow_mut() = Some(reason);
            }),
        );

        run_until(&mut a, 200, |_| false);
        for _ in 0..200 {
            b.update();
            a.update();
            if failed.borrow().is_some() {
                break;
            }
        }

        assert_eq!(*failed.borrow(), Some(ConnectFailReason::ConnectionNotMaster));
        assert!(matches!(a.state(), HostState::NotConnected));
    }

    #[test]
    fn send_is_an_unimplemented_stub() {
        let net = InMemoryNetwork::new();
        let addr = NetAddress::ipv4(127, 0, 0, 1, 1);
        let mut host = Host::new(net.endpoint(addr), true, "master", addr, addr);

        let unknown = Handle { index: 9, nonce: 9 };
        assert!(!host.send(unknown, b"hi"));
    }

    #[test]
    fn three_node_join_connects_the_two_ordinary_nodes_to_each_other() {
        let net = InMemoryNetwork::new();
        let master_addr = NetAddress::ipv4(127, 0, 0, 1, 48800);
        let alice_addr = NetAddress::ipv4(127, 0, 0, 1, 48801);
        let bob_addr = NetAddress::ipv4(127, 0, 0, 1, 48802);

        let mut master = Host::new(net.endpoint(master_addr), true, "master", master_addr, master_addr);
        let mut alice = Host::new(net.endpoint(alice_addr), false, "alice", alice_addr, alice_addr);
        let mut bob = Host::new(net.endpoint(bob_addr), false, "bob", bob_addr, bob_addr);

        alice.connect([master_addr, master_addr], Box::new(|_| panic!("alice connect failed")));
        for _ in 0..50 {
            master.update();
            alice.update();
            if matches!(alice.state(), HostState::Idle) {
                break;
            }
        }
        assert!(matches!(alice.state(), HostState::Idle));

        bob.connect([master_addr, master_addr], Box::new(|_| panic!("bob connect failed")));
        for _ in 0..200 {
            master.update();
            alice.update();
            bob.update();
            if matches!(bob.state(), HostState::Idle) {
                break;
            }
        }
        assert!(matches!(bob.state(), HostState::Idle));

        // Give the already-punched alice<->bob link a few more ticks to
        // exchange Join/JoinOk after bob's own roster punch resolves.
        for _ in 0..50 {
            master.update();
            alice.update();
            bob.update();
        }

        let mut alice_sees_bob = false;
        alice.query_peer_infos(|_h, info| {
            if info.nickname == "bob" && info.status == PeerStatus::Connected {
                alice_sees_bob = true;
            }
        });
        let mut bob_sees_alice = false;
        bob.query_peer_infos(|_h, info| {
            if info.nickname == "alice" && info.status == PeerStatus::Connected {
                bob_sees_alice = true;
            }
        });

        assert!(alice_sees_bob, "alice should have bob as a connected peer");
        assert!(bob_sees_alice, "bob should have alice as a connected peer");
    }

    #[test]
    fn retries_five_times_then_fails_when_master_never_answers() {
        let net = InMemoryNetwork::new();
        let ordinary_addr = NetAddress::ipv4(127, 0, 0, 1, 1);
        let silent_master_addr = NetAddress::ipv4(127, 0, 0, 1, 2);

        // No Host bound at `silent_master_addr` — every Request vanishes,
        // but the initial punch still needs a Pong to leave NotConnected,
        // so bind a bare transport there just to answer Pings.
        let mut silent = net.endpoint(silent_master_addr);

        let mut ordinary = Host::new(net.endpoint(ordinary_addr), false, "alice", ordinary_addr, ordinary_addr);

        let failed = Rc::new(RefCell::new(None));
        let failed_ = failed.clone();
        ordinary.connect(
            [silent_master_addr, silent_master_addr],
            Box::new(move |reason| {
                *failed_.borrow_mut() = Some(reason);
            }),
        );

        // The retry deadline is real wall-clock time (`Instant`), so this
        // has to actually let it elapse: CONNECT_MAX_RETRIES resends, each
        // CONNECT_RETRY_TIMEOUT_MS apart, plus slack for scheduling jitter.
        let budget = Duration::from_millis(CONNECT_RETRY_TIMEOUT_MS * (CONNECT_MAX_RETRIES as u64 + 1) + 2000);
        let start = Instant::now();
        while start.elapsed() < budget {
            ordinary.update();
            // Answer Pings with Pongs (so the punch resolves into
            // WaitResponse) but never answer a Request.
            if let Some((bytes, src)) = silent.recv_from() {
                if let Ok(HostMessage::Ping(handle)) = HostMessage::decode(&bytes) {
                    silent.send_to(&HostMessage::Pong(handle).encode(), src);
                }
            }
            if failed.borrow().is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(*failed.borrow(), Some(ConnectFailReason::ConnectionResponseTimeout));
        assert!(matches!(ordinary.state(), HostState::NotConnected));
    }
}

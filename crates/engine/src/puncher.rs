//! Symmetric UDP hole punching (C4).
//!
//! For every registered remote host, blasts a `Ping` carrying that host's
//! handle at every candidate address on a fixed resend cadence, until a
//! matching `Pong` identifies a working path. Both ends run this component;
//! whichever side's datagram first lands on an open pinhole wins the race.

use crate::pool::PoolMirror;
use crate::transport::UdpTransport;
use codec::message::HostMessage;
use codec::{Handle, NetAddress};
use std::time::{Duration, Instant};

/// Fixed address primed with a dummy ping when a peer has no candidates and
/// `autoping` is enabled (master role) — solely to keep the local NAT
/// mapping warm, no reply is expected.
pub const AUTOPING_TARGET: NetAddress = NetAddress {
    addr: u32::from_be_bytes([8, 8, 8, 8]),
    port: 48800,
};

const RESEND_PERIOD: Duration = Duration::from_millis(1000);

/// One-shot notifier invoked with the address the puncher settled on.
pub type PunchCallback = Box<dyn FnOnce(NetAddress)>;

struct PendingPunch {
    candidates: Vec<NetAddress>,
    valid_address: Option<NetAddress>,
    callback: Option<PunchCallback>,
}

/// Drives parallel ping/pong probes for every peer currently being punched.
pub struct HolePuncher {
    pending: PoolMirror<PendingPunch>,
    last_resend: Instant,
    autoping: bool,
}

impl HolePuncher {
    /// `autoping`: whether an empty candidate list should still prime the
    /// NAT with a dummy ping (set for the master role).
    pub fn new(autoping: bool) -> Self {
        Self {
            pending: PoolMirror::new(),
            // Already due: a freshly registered target gets its first PING
            // on the very next `update()` rather than waiting out a full
            // resend period, so a newly connecting peer doesn't sit idle.
            last_resend: Instant::now() - RESEND_PERIOD,
            autoping,
        }
    }

    pub fn is_pending(&self, handle: Handle) -> bool {
        self.pending.get(handle).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.count()
    }

    /// Registers a new punch target. `timeout` is accepted for API parity
    /// with the distilled protocol's signature but is advisory metadata
    /// only — this puncher never reads it back.
    pub fn add_remote_host(
        &mut self,
        handle: Handle,
        candidates: Vec<NetAddress>,
        _timeout: Duration,
        callback: PunchCallback,
    ) {
        self.pending.make(
            handle,
            PendingPunch {
                candidates,
                valid_address: None,
                callback: Some(callback),
            },
        );
    }

    pub fn del_remote_host(&mut self, handle: Handle) {
        self.pending.destroy(handle);
    }

    /// Replies to an inbound `Ping`, echoing the sender's own embedded
    /// handle back as a `Pong`.
    pub fn on_ping_received(&self, transport: &mut impl UdpTransport, src: NetAddress, handle: Handle) {
        transport.send_to(&HostMessage::Pong(handle).encode(), src);
    }

    /// Handles an inbound `Pong`. The first one for a given handle wins:
    /// it records `src` as the valid address and fires the one-shot
    /// callback. Every subsequent `Pong` for the same (now-removed) handle
    /// is logged and dropped.
    pub fn on_pong_received(&mut self, src: NetAddress, handle: Handle) {
        let Some(entry) = self.pending.get_mut(handle) else {
            log::debug!("pong for unknown or already-resolved punch handle {handle:?}");
            return;
        };

        if entry.valid_address.is_some() {
            // Already resolved; a late duplicate pong. One-shot contract:
            // do not fire again.
            return;
        }

        entry.valid_address = Some(src);
        if let Some(callback) = entry.callback.take() {
            callback(src);
        }
    }

    /// Resends `Ping`s to every candidate of every still-pending handle, if
    /// the resend timer has elapsed since the last call.
    pub fn update(&mut self, transport: &mut impl UdpTransport) {
        if self.last_resend.elapsed() < RESEND_PERIOD {
            return;
        }
        self.last_resend = Instant::now();

        for (handle, entry) in self.pending.iter() {
            if entry.candidates.is_empty() {
                if self.autoping {
                    let frame = HostMessage::Ping(Handle::INVALID).encode();
                    transport.send_to(&frame, AUTOPING_TARGET);
                }
                continue;
            }

            let frame = HostMessage::Ping(handle).encode();
            for candidate in &entry.candidates {
                transport.send_to(&frame, *candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryNetwork;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn callback_fires_exactly_once_on_first_pong() {
        let mut puncher = HolePuncher::new(false);
        let handle = Handle {
            index: 0,
            nonce: 1,
        };
        let fired = Rc::new(RefCell::new(0));
        let fired_ = fired.clone();

        puncher.add_remote_host(
            handle,
            vec![NetAddress::ipv4(10, 0, 0, 1, 1000)],
            Duration::from_millis(1000),
            Box::new(move |_addr| {
                *fired_.borrow_mut() += 1;
            }),
        );

        let first = NetAddress::ipv4(203, 0, 113, 5, 40000);
        let second = NetAddress::ipv4(203, 0, 113, 6, 40001);

        puncher.on_pong_received(first, handle);
        puncher.on_pong_received(second, handle);

        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn pong_for_unknown_handle_is_dropped_without_panicking() {
        let mut puncher = HolePuncher::new(false);
        let unknown = Handle {
            index: 5,
            nonce: 1,
        };
        puncher.on_pong_received(NetAddress::ipv4(1, 2, 3, 4, 5), unknown);
    }

    #[test]
    fn resend_hits_every_candidate_each_period() {
        let net = InMemoryNetwork::new();
        let self_addr = NetAddress::ipv4(10, 0, 0, 1, 1);
        let mut transport = net.endpoint(self_addr);

        let candidate_a = NetAddress::ipv4(10, 0, 0, 2, 1);
        let candidate_b = NetAddress::ipv4(10, 0, 0, 3, 1);
        let mut observer_a = net.endpoint(candidate_a);
        let mut observer_b = net.endpoint(candidate_b);

        let mut puncher = HolePuncher::new(false);
        let handle = Handle {
            index: 0,
            nonce: 1,
        };
        puncher.add_remote_host(
            handle,
            vec![candidate_a, candidate_b],
            Duration::from_millis(1000),
            Box::new(|_| {}),
        );

        // Force the timer to have elapsed so the first `update` resends.
        puncher.last_resend = Instant::now() - RESEND_PERIOD;
        puncher.update(&mut transport);

        assert!(observer_a.recv_from().is_some());
        assert!(observer_b.recv_from().is_some());

        // A second call inside the same period must not resend again.
        puncher.update(&mut transport);
        assert_eq!(observer_a.recv_from(), None);
    }
}

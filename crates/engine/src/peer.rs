use codec::{Handle, NetAddress};

/// Runtime status of a [`Peer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerStatus {
    Connecting,
    Connected,
    Inactive,
    Offline,
    Disconnecting,
}

/// Index into [`Peer::addresses`].
pub const ADDR_HOST: usize = 0;
pub const ADDR_GRAY: usize = 1;
pub const ADDR_WHITE: usize = 2;

/// A remote (or, on the master, a joined) endpoint the host is tracking.
///
/// Identified externally by a [`Handle`] rather than by address, so it
/// survives being moved between the host's own pool and callbacks
/// registered with the hole puncher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub nickname: String,
    /// `[host-observed, gray/LAN, white/public]`.
    pub addresses: [NetAddress; 3],
    pub status: PeerStatus,
}

impl Peer {
    pub fn new(nickname: impl Into<String>, addresses: [NetAddress; 3]) -> Self {
        Self {
            nickname: nickname.into(),
            addresses,
            status: PeerStatus::Connecting,
        }
    }

    pub fn host_address(&self) -> NetAddress {
        self.addresses[ADDR_HOST]
    }
}

/// A snapshot handed to observers via `Host::query_peer_infos`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub handle: Handle,
    pub nickname: String,
    pub status: PeerStatus,
}

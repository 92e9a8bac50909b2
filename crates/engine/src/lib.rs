//! NAT discovery, UDP hole punching and the master/ordinary rendezvous
//! state machine driving a single shared UDP socket.

pub mod host;
pub mod peer;
pub mod pool;
pub mod puncher;
pub mod stun;
pub mod transport;

pub use host::{ConnectFailReason, Host, HostState, PeerObserver};
pub use peer::{Peer, PeerInfo, PeerStatus};
pub use pool::{Pool, PoolMirror};
pub use puncher::HolePuncher;
pub use stun::{NatProbeResult, NatType, StunProbe};
pub use transport::UdpTransport;

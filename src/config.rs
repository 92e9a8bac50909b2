//! CLI surface and the `Config` it resolves into.
//!
//! The host engine only ever sees a fully-resolved [`Config`]; everything
//! DNS- or argv-shaped stays in this module.

use clap::Parser;
use codec::NetAddress;
use std::net::{SocketAddr, ToSocketAddrs};

/// Node role this process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ordinary,
    Master,
    /// No concrete CLI path produces this — reserved for a future config
    /// source (e.g. a file) that could leave the role unspecified.
    Unknown,
    /// Reserved the same way; `clap` handles `-h`/`--help` itself and exits
    /// before a `Config` is ever built.
    Help,
}

/// Command-line flags, parsed by `clap`'s derive surface.
#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION")
)]
pub struct Cli {
    /// Run as the rendezvous (master) node instead of an ordinary one.
    #[arg(short = 'm', long = "master")]
    pub master: bool,

    /// Nickname advertised to peers.
    #[arg(short = 'n', long = "nickname")]
    pub nickname: Option<String>,

    /// Master node address, required for an ordinary node's `connect`.
    #[arg(short = 'r', long = "remote-address")]
    pub remote_address: Option<String>,

    /// Local address this node binds its UDP endpoint to.
    #[arg(short = 'l', long = "local-address", default_value = "0.0.0.0:48800")]
    pub local_address: String,

    /// STUN server used for the startup NAT probe.
    #[arg(short = 'e', long = "endpoint", default_value = "stun.l.google.com:19302")]
    pub endpoint: String,

    /// Overrides the port component of `--local-address`.
    #[arg(long = "localport")]
    pub localport: Option<u16>,
}

/// Fully-resolved configuration the engine is driven by.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub nickname: String,
    pub remote_server_address: NetAddress,
    pub local_server_address: NetAddress,
    pub endpoint: NetAddress,
}

impl Config {
    pub fn is_master(&self) -> bool {
        matches!(self.mode, Mode::Master)
    }

    /// Mirrors the distilled original's validity rule: a role must be
    /// chosen, a nickname must be set, and an ordinary node must know where
    /// to send its `Request`.
    pub fn is_valid(&self) -> bool {
        self.mode != Mode::Unknown
            && !self.nickname.is_empty()
            && (self.is_master() || self.remote_server_address.port != 0)
    }
}

impl TryFrom<Cli> for Config {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> anyhow::Result<Self> {
        let mode = if cli.master { Mode::Master } else { Mode::Ordinary };

        let mut local_server_address = parse_net_address(&cli.local_address)?;
        if let Some(port) = cli.localport {
            local_server_address.port = port;
        }

        let remote_server_address = match cli.remote_address {
            Some(addr) => parse_net_address(&addr)?,
            None => NetAddress::any(0),
        };

        let endpoint = parse_net_address(&cli.endpoint)?;

        Ok(Config {
            mode,
            nickname: cli.nickname.unwrap_or_default(),
            remote_server_address,
            local_server_address,
            endpoint,
        })
    }
}

/// Resolves a `HOST:PORT` string (DNS or literal) to an IPv4 [`NetAddress`].
/// IPv6 results are skipped — IPv6 is a non-goal of this protocol.
fn parse_net_address(value: &str) -> anyhow::Result<NetAddress> {
    let resolved = value
        .to_socket_addrs()
        .map_err(|e| anyhow::anyhow!("invalid address {value:?}: {e}"))?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| anyhow::anyhow!("{value:?} did not resolve to an IPv4 address"))?;

    match resolved {
        SocketAddr::V4(v4) => Ok(NetAddress {
            addr: u32::from(*v4.ip()),
            port: v4.port(),
        }),
        SocketAddr::V6(_) => unreachable!("filtered to IPv4 above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            mode: Mode::Ordinary,
            nickname: "alice".to_string(),
            remote_server_address: NetAddress::ipv4(127, 0, 0, 1, 48800),
            local_server_address: NetAddress::any(48801),
            endpoint: NetAddress::ipv4(8, 8, 8, 8, 19302),
        }
    }

    #[test]
    fn ordinary_node_needs_a_remote_address() {
        let mut config = base_config();
        assert!(config.is_valid());

        config.remote_server_address.port = 0;
        assert!(!config.is_valid());
    }

    #[test]
    fn master_node_does_not_need_a_remote_address() {
        let mut config = base_config();
        config.mode = Mode::Master;
        config.remote_server_address = NetAddress::any(0);
        assert!(config.is_valid());
    }

    #[test]
    fn empty_nickname_is_invalid() {
        let mut config = base_config();
        config.nickname.clear();
        assert!(!config.is_valid());
    }

    #[test]
    fn literal_address_parses_without_dns() {
        let addr = parse_net_address("127.0.0.1:48800").unwrap();
        assert_eq!(addr, NetAddress::ipv4(127, 0, 0, 1, 48800));
    }
}

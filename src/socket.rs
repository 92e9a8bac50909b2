//! Concrete [`UdpTransport`] over `std::net::UdpSocket`.
//!
//! The only OS-specific adapter the binary crate owns; everything upstream
//! of this module talks to the `engine::UdpTransport` trait.

use codec::NetAddress;
use engine::UdpTransport;
use engine::transport::net_to_socket_addr;
use std::net::SocketAddr;

/// A non-blocking UDP socket bound once at startup and held for the life of
/// the process.
pub struct StdUdpTransport {
    socket: std::net::UdpSocket,
    local: NetAddress,
    last_error: Option<String>,
}

impl StdUdpTransport {
    pub fn bind(addr: NetAddress) -> anyhow::Result<Self> {
        let socket = std::net::UdpSocket::bind(net_to_socket_addr(addr))?;
        socket.set_nonblocking(true)?;

        let local = match socket.local_addr()? {
            SocketAddr::V4(v4) => NetAddress {
                addr: u32::from(*v4.ip()),
                port: v4.port(),
            },
            SocketAddr::V6(_) => addr,
        };

        Ok(Self {
            socket,
            local,
            last_error: None,
        })
    }
}

impl UdpTransport for StdUdpTransport {
    fn send_to(&mut self, bytes: &[u8], dest: NetAddress) {
        if let Err(e) = self.socket.send_to(bytes, net_to_socket_addr(dest)) {
            log::debug!("udp send to {dest} failed: {e}");
            self.last_error = Some(e.to_string());
        }
    }

    fn recv_from(&mut self) -> Option<(Vec<u8>, NetAddress)> {
        let mut buf = [0u8; 1500];
        match self.socket.recv_from(&mut buf) {
            Ok((n, SocketAddr::V4(src))) => Some((
                buf[..n].to_vec(),
                NetAddress {
                    addr: u32::from(*src.ip()),
                    port: src.port(),
                },
            )),
            // IPv6 peers are a non-goal of this protocol; drop silently.
            Ok((_, SocketAddr::V6(_))) => None,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(e) => {
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    fn local_addr(&self) -> NetAddress {
        self.local
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

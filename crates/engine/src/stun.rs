//! STUN-based NAT discovery (C3).
//!
//! Implements the subset of RFC 5389 binding discovery needed to classify
//! the local NAT and learn the public-facing ("white") mapping, per the
//! classification algorithm. The send loop and attribute parsing live in
//! [`codec::stun`]; this module owns only the retry/timeout policy and the
//! classification decision tree.

use crate::transport::UdpTransport;
use codec::NetAddress;
use codec::stun::{self, TransactionId};
use rand::RngCore;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Classification of the local NAT, per the STUN probe decision tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NatType {
    Unknown,
    Open,
    FullCone,
    AddressRestricted,
    PortRestricted,
    Symmetric,
    Blocked,
}

/// Outcome of a single classification run against one STUN server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatProbeResult {
    pub nat_type: NatType,
    pub gray_address: NetAddress,
    pub white_address: Option<NetAddress>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Drives the STUN send/retry loop and the NAT classification decision
/// tree. Timeouts and retry count are fields (not free constants) so
/// tests can shrink them and keep the suite fast.
#[derive(Debug, Clone, Copy)]
pub struct StunProbe {
    pub max_retries: u32,
    pub long_timeout: Duration,
    pub short_timeout: Duration,
}

impl Default for StunProbe {
    fn default() -> Self {
        Self {
            max_retries: 3,
            long_timeout: Duration::from_millis(1000),
            short_timeout: Duration::from_millis(100),
        }
    }
}

impl StunProbe {
    /// Resolves the local gray (LAN) address: the real LAN IP (learned by
    /// connecting a scratch TCP socket to `probe_host` and reading its
    /// local name) combined with the UDP transport's own bound port,
    /// falling back to the transport's bound address entirely if the TCP
    /// probe fails.
    pub fn resolve_gray_address(transport: &impl UdpTransport, probe_host: &str) -> NetAddress {
        let local = transport.local_addr();
        let ip = std::net::TcpStream::connect(probe_host)
            .ok()
            .and_then(|stream| stream.local_addr().ok())
            .and_then(|addr| match addr {
                SocketAddr::V4(v4) => Some(u32::from(*v4.ip())),
                SocketAddr::V6(_) => None,
            })
            .unwrap_or(local.addr);

        NetAddress {
            addr: ip,
            port: local.port,
        }
    }

    /// Runs the classification algorithm against a single STUN server.
    pub fn classify(
        &self,
        transport: &mut impl UdpTransport,
        server: NetAddress,
        gray_address: NetAddress,
    ) -> NatProbeResult {
        let plain = match self.send_bind(transport, server, false, false, self.long_timeout) {
            Some(response) => response,
            None => {
                return NatProbeResult {
                    nat_type: NatType::Blocked,
                    gray_address,
                    white_address: None,
                };
            }
        };

        let white = match plain.mapped_address {
            Some(addr) => addr,
            None => {
                return NatProbeResult {
                    nat_type: NatType::Unknown,
                    gray_address,
                    white_address: None,
                };
            }
        };

        if gray_address == white {
            return NatProbeResult {
                nat_type: NatType::Open,
                gray_address,
                white_address: Some(white),
            };
        }

        let other = match plain.other_address {
            Some(addr) => addr,
            None => {
                return NatProbeResult {
                    nat_type: NatType::Unknown,
                    gray_address,
                    white_address: Some(white),
                };
            }
        };

        if self
            .send_bind(transport, server, true, true, self.short_timeout)
            .is_some()
        {
            return NatProbeResult {
                nat_type: NatType::FullCone,
                gray_address,
                white_address: Some(white),
            };
        }

        let tentative = if self
            .send_bind(transport, server, false, true, self.short_timeout)
            .is_some()
        {
            NatType::AddressRestricted
        } else {
            NatType::PortRestricted
        };

        let alternate = NetAddress {
            addr: other.addr,
            port: plain.response_origin.map(|o| o.port).unwrap_or(other.port),
        };

        let alt_response = match self.send_bind(transport, alternate, false, false, self.long_timeout) {
            Some(response) => response,
            None => {
                return NatProbeResult {
                    nat_type: NatType::Unknown,
                    gray_address,
                    white_address: Some(white),
                };
            }
        };

        let nat_type = match alt_response.mapped_address {
            Some(mapped) if mapped != white => NatType::Symmetric,
            _ => tentative,
        };

        NatProbeResult {
            nat_type,
            gray_address,
            white_address: Some(white),
        }
    }

    fn send_bind(
        &self,
        transport: &mut impl UdpTransport,
        server: NetAddress,
        change_ip: bool,
        change_port: bool,
        timeout: Duration,
    ) -> Option<stun::BindResponse> {
        for _ in 0..self.max_retries {
            let transaction_id = random_transaction_id();
            let request = stun::encode_bind_request(transaction_id, change_ip, change_port);
            transport.send_to(&request, server);

            let deadline = Instant::now() + timeout;
            loop {
                if let Some((bytes, _src)) = transport.recv_from() {
                    if let Ok(response) = stun::decode_bind_response(&bytes, &transaction_id) {
                        return Some(response);
                    }
                    continue;
                }

                if Instant::now() >= deadline {
                    break;
                }

                std::thread::sleep(POLL_INTERVAL);
            }
        }

        None
    }
}

fn random_transaction_id() -> TransactionId {
    let mut id = [0u8; 12];
    rand::rng().fill_bytes(&mut id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryNetwork;
    use bytes::BufMut;
    use codec::stun::{BINDING_RESPONSE, MAGIC_COOKIE};
    use std::sync::Arc;

    fn fast_probe() -> StunProbe {
        StunProbe {
            max_retries: 1,
            long_timeout: Duration::from_millis(20),
            short_timeout: Duration::from_millis(10),
        }
    }

    fn encode_response(
        transaction_id: [u8; 12],
        mapped: NetAddress,
        other: Option<NetAddress>,
        origin: Option<NetAddress>,
    ) -> Vec<u8> {
        let mut attrs = bytes::BytesMut::new();
        attrs.put_u16(0x0001);
        attrs.put_u16(8);
        mapped.encode_stun_attr(&mut attrs);

        if let Some(other) = other {
            attrs.put_u16(0x802c);
            attrs.put_u16(8);
            other.encode_stun_attr(&mut attrs);
        }

        if let Some(origin) = origin {
            attrs.put_u16(0x802b);
            attrs.put_u16(8);
            origin.encode_stun_attr(&mut attrs);
        }

        let mut buf = bytes::BytesMut::new();
        buf.put_u16(BINDING_RESPONSE);
        buf.put_u16(attrs.len() as u16);
        buf.put_u32(MAGIC_COOKIE);
        buf.put(&transaction_id[..]);
        buf.put(attrs);
        buf.to_vec()
    }

    /// Runs a scripted STUN server on its own thread for the duration of
    /// `body`: every request received gets back `encode_response(txid,
    /// mapped, other, origin)`. Joined before returning, so the test never
    /// leaks a background thread.
    fn with_scripted_server<R>(
        mut server: crate::transport::InMemoryTransport,
        mapped: NetAddress,
        other: Option<NetAddress>,
        origin: Option<NetAddress>,
        body: impl FnOnce() -> R,
    ) -> R {
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_ = stop.clone();

        let handle = std::thread::spawn(move || {
            while !stop_.load(std::sync::atomic::Ordering::Relaxed) {
                if let Some((bytes, src)) = server.recv_from() {
                    if bytes.len() >= 20 {
                        let mut txid = [0u8; 12];
                        txid.copy_from_slice(&bytes[8..20]);
                        let response = encode_response(txid, mapped, other, origin);
                        server.send_to(&response, src);
                    }
                } else {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        });

        let result = body();
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        handle.join().unwrap();
        result
    }

    #[test]
    fn open_when_mapped_address_matches_gray_address() {
        let net = InMemoryNetwork::new();
        let client_addr = NetAddress::ipv4(203, 0, 113, 9, 40000);
        let server_addr = NetAddress::ipv4(198, 51, 100, 1, 3478);

        let mut client = net.endpoint(client_addr);
        let server = net.endpoint(server_addr);
        let probe = fast_probe();

        let result = with_scripted_server(
            server,
            client_addr,
            Some(client_addr),
            Some(client_addr),
            || probe.classify(&mut client, server_addr, client_addr),
        );

        assert_eq!(result.nat_type, NatType::Open);
        assert_eq!(result.white_address, Some(client_addr));
    }

    #[test]
    fn blocked_when_server_never_answers() {
        let net = InMemoryNetwork::new();
        let client_addr = NetAddress::ipv4(203, 0, 113, 9, 40000);
        let server_addr = NetAddress::ipv4(198, 51, 100, 1, 3478);
        let mut client = net.endpoint(client_addr);
        let probe = fast_probe();

        let result = probe.classify(&mut client, server_addr, client_addr);
        assert_eq!(result.nat_type, NatType::Blocked);
        assert_eq!(result.white_address, None);
    }

    #[test]
    fn full_cone_when_change_ip_and_port_both_answer() {
        let net = InMemoryNetwork::new();
        let client_addr = NetAddress::ipv4(10, 0, 0, 5, 40000);
        let server_addr = NetAddress::ipv4(198, 51, 100, 1, 3478);
        let white = NetAddress::ipv4(203, 0, 113, 9, 55000);
        let other = NetAddress::ipv4(198, 51, 100, 2, 3479);

        let mut client = net.endpoint(client_addr);
        let server = net.endpoint(server_addr);
        let probe = fast_probe();

        let result = with_scripted_server(server, white, Some(other), Some(other), || {
            probe.classify(&mut client, server_addr, client_addr)
        });

        assert_eq!(result.nat_type, NatType::FullCone);
        assert_eq!(result.white_address, Some(white));
    }
}

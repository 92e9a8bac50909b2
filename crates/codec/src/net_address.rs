use crate::Error;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::Ipv4Addr;

/// Size, in bytes, of a [`NetAddress`] encoded on the host-protocol wire.
///
/// The layout mirrors a raw `sockaddr_in`: 2 reserved bytes, a 2-byte port,
/// a 4-byte IPv4 address and 8 trailing padding bytes. `Response` fragment
/// sizing depends on this being a fixed width.
pub const WIRE_LEN: usize = 16;

/// An IPv4 endpoint: a 32-bit address plus a 16-bit port.
///
/// Port `0` denotes "unset" (see [`NetAddress::is_unset`]); equality is
/// bitwise over both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NetAddress {
    pub addr: u32,
    pub port: u16,
}

impl NetAddress {
    /// The wildcard address `0.0.0.0` bound to `port`.
    ///
    /// # Test
    ///
    /// ```
    /// use rally_node_codec::NetAddress;
    ///
    /// let a = NetAddress::any(48800);
    /// assert_eq!(a.addr, 0);
    /// assert_eq!(a.port, 48800);
    /// assert!(!NetAddress::any(1).is_unset());
    /// assert!(NetAddress::any(0).is_unset());
    /// ```
    pub fn any(port: u16) -> Self {
        Self { addr: 0, port }
    }

    pub fn ipv4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self {
            addr: u32::from_be_bytes([a, b, c, d]),
            port,
        }
    }

    /// Port `0` denotes "unset" per the data model.
    pub fn is_unset(&self) -> bool {
        self.port == 0
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.addr)
    }

    /// Appends the 16-byte host-protocol wire block for this address.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use rally_node_codec::NetAddress;
    ///
    /// let mut buf = BytesMut::new();
    /// NetAddress::ipv4(127, 0, 0, 1, 48800).encode(&mut buf);
    /// assert_eq!(buf.len(), 16);
    /// assert_eq!(&buf[2..4], &48800u16.to_be_bytes());
    /// assert_eq!(&buf[4..8], &[127, 0, 0, 1]);
    /// ```
    pub fn encode(&self, bytes: &mut BytesMut) {
        bytes.put_u16(0);
        bytes.put_u16(self.port);
        bytes.put_u32(self.addr);
        bytes.put(&[0u8; 8][..]);
    }

    /// Decodes the 16-byte host-protocol wire block.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use rally_node_codec::NetAddress;
    ///
    /// let mut buf = BytesMut::new();
    /// let original = NetAddress::ipv4(10, 0, 0, 5, 1234);
    /// original.encode(&mut buf);
    ///
    /// let decoded = NetAddress::decode(&buf).unwrap();
    /// assert_eq!(decoded, original);
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < WIRE_LEN {
            return Err(Error::Truncated);
        }

        let port = u16::from_be_bytes(bytes[2..4].try_into().unwrap());
        let addr = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        Ok(Self { addr, port })
    }

    /// Encodes the 8-byte STUN `ADDRESS` attribute value (IPv4 only).
    pub fn encode_stun_attr(&self, bytes: &mut BytesMut) {
        bytes.put_u8(0);
        bytes.put_u8(0x01);
        bytes.put_u16(self.port);
        bytes.put_u32(self.addr);
    }

    /// Decodes the 8-byte STUN `ADDRESS` attribute value (IPv4 only).
    pub fn decode_stun_attr(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 8 {
            return Err(Error::Truncated);
        }

        let port = u16::from_be_bytes(bytes[2..4].try_into().unwrap());
        let addr = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        Ok(Self { addr, port })
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port)
    }
}

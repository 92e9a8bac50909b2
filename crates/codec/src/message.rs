//! Host protocol framing: the message table from the wire codec component.
//!
//! Every frame starts with a big-endian `u16` message id. Payloads are
//! fixed-layout and packed; nothing here relies on Rust struct layout, each
//! field is written and read explicitly.

use crate::{Error, Handle, NetAddress};
use bytes::{BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const NICKNAME_LEN: usize = 32;

/// Message ids multiplexed over the single shared UDP socket.
///
/// Id `7` is deliberately unused: the distilled protocol this crate
/// implements never assigned it (an earlier, unsupported message kind
/// occupied it upstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum MsgId {
    Ping = 0,
    Pong = 1,
    Heartbeat = 2,
    Request = 3,
    Reject = 4,
    Response = 5,
    PingA = 6,
    Join = 8,
    JoinOk = 9,
}

/// Reasons a master node can refuse a `Request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum RejectReason {
    NotMaster = 0,
    InvalidMessageFormat = 1,
    AlreadyRegistered = 2,
}

/// Truncates (or NUL-pads) `s` into the fixed 32-byte nickname field.
///
/// # Test
///
/// ```
/// use rally_node_codec::message::{encode_nickname, decode_nickname};
///
/// let wire = encode_nickname("alice");
/// assert_eq!(wire.len(), 32);
/// assert_eq!(decode_nickname(&wire), "alice");
/// ```
pub fn encode_nickname(s: &str) -> [u8; NICKNAME_LEN] {
    let mut out = [0u8; NICKNAME_LEN];
    let bytes = s.as_bytes();
    let n = bytes.len().min(NICKNAME_LEN - 1);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Reads a NUL-terminated nickname out of its 32-byte wire field.
pub fn decode_nickname(bytes: &[u8; NICKNAME_LEN]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Payload shared by `Request` and `PingA`: the sender's gray/white
/// addresses plus its nickname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub gray: NetAddress,
    pub white: NetAddress,
    pub nickname: [u8; NICKNAME_LEN],
}

pub const REQUEST_BODY_LEN: usize = crate::net_address::WIRE_LEN * 2 + NICKNAME_LEN;

impl RequestBody {
    fn encode(&self, bytes: &mut BytesMut) {
        self.gray.encode(bytes);
        self.white.encode(bytes);
        bytes.put(&self.nickname[..]);
    }

    fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != REQUEST_BODY_LEN {
            return Err(Error::LengthMismatch);
        }

        let gray = NetAddress::decode(bytes)?;
        let white = NetAddress::decode(&bytes[crate::net_address::WIRE_LEN..])?;
        let mut nickname = [0u8; NICKNAME_LEN];
        nickname.copy_from_slice(&bytes[crate::net_address::WIRE_LEN * 2..REQUEST_BODY_LEN]);
        Ok(Self {
            gray,
            white,
            nickname,
        })
    }
}

/// One entry in a `Response`'s roster: a peer's three observed addresses
/// (host/gray/white) and nickname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFragment {
    pub addresses: [NetAddress; 3],
    pub nickname: [u8; NICKNAME_LEN],
}

pub const RESPONSE_FRAGMENT_LEN: usize = crate::net_address::WIRE_LEN * 3 + NICKNAME_LEN;

impl ResponseFragment {
    fn encode(&self, bytes: &mut BytesMut) {
        for a in &self.addresses {
            a.encode(bytes);
        }
        bytes.put(&self.nickname[..]);
    }

    fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < RESPONSE_FRAGMENT_LEN {
            return Err(Error::Truncated);
        }

        let wl = crate::net_address::WIRE_LEN;
        let addresses = [
            NetAddress::decode(&bytes[0..])?,
            NetAddress::decode(&bytes[wl..])?,
            NetAddress::decode(&bytes[wl * 2..])?,
        ];
        let mut nickname = [0u8; NICKNAME_LEN];
        nickname.copy_from_slice(&bytes[wl * 3..RESPONSE_FRAGMENT_LEN]);
        Ok(Self {
            addresses,
            nickname,
        })
    }
}

/// Every frame this crate can encode or decode over the host protocol's
/// shared UDP socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    Ping(Handle),
    Pong(Handle),
    Heartbeat,
    Request(RequestBody),
    Reject(RejectReason),
    Response {
        nickname: [u8; NICKNAME_LEN],
        fragments: Vec<ResponseFragment>,
    },
    PingA(RequestBody),
    Join([u8; NICKNAME_LEN]),
    JoinOk,
}

const RESPONSE_HEADER_LEN: usize = 2 + NICKNAME_LEN;

impl HostMessage {
    /// Encodes `self`, including its leading 2-byte message id, into a
    /// freshly allocated buffer.
    ///
    /// # Test
    ///
    /// ```
    /// use rally_node_codec::message::HostMessage;
    /// use rally_node_codec::Handle;
    ///
    /// let msg = HostMessage::Ping(Handle { index: 1, nonce: 2 });
    /// let buf = msg.encode();
    ///
    /// assert_eq!(&buf[0..2], &0u16.to_be_bytes());
    /// assert_eq!(HostMessage::decode(&buf).unwrap(), msg);
    /// ```
    pub fn encode(&self) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(128);
        match self {
            HostMessage::Ping(handle) => {
                bytes.put_u16(MsgId::Ping.into());
                handle.encode(&mut bytes);
            }
            HostMessage::Pong(handle) => {
                bytes.put_u16(MsgId::Pong.into());
                handle.encode(&mut bytes);
            }
            HostMessage::Heartbeat => {
                bytes.put_u16(MsgId::Heartbeat.into());
            }
            HostMessage::Request(body) => {
                bytes.put_u16(MsgId::Request.into());
                body.encode(&mut bytes);
            }
            HostMessage::Reject(reason) => {
                bytes.put_u16(MsgId::Reject.into());
                bytes.put_u16((*reason).into());
            }
            HostMessage::Response {
                nickname,
                fragments,
            } => {
                bytes.put_u16(MsgId::Response.into());
                bytes.put_u16(fragments.len() as u16);
                bytes.put(&nickname[..]);
                for fragment in fragments {
                    fragment.encode(&mut bytes);
                }
            }
            HostMessage::PingA(body) => {
                bytes.put_u16(MsgId::PingA.into());
                body.encode(&mut bytes);
            }
            HostMessage::Join(nickname) => {
                bytes.put_u16(MsgId::Join.into());
                bytes.put(&nickname[..]);
            }
            HostMessage::JoinOk => {
                bytes.put_u16(MsgId::JoinOk.into());
            }
        }

        bytes
    }

    /// Decodes a datagram into a [`HostMessage`].
    ///
    /// A frame whose declared length does not match its actual size, or
    /// whose leading id is unknown, is rejected with an [`Error`] — callers
    /// must log and discard without any state change, never partially
    /// act on a malformed buffer.
    ///
    /// # Test
    ///
    /// ```
    /// use rally_node_codec::message::HostMessage;
    ///
    /// // Truncated Join: declares a nickname but the buffer doesn't carry one.
    /// let bytes = [0u8, 8];
    /// assert!(HostMessage::decode(&bytes).is_err());
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 2 {
            return Err(Error::Truncated);
        }

        let raw_id = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
        let id = MsgId::try_from(raw_id).map_err(|_| Error::UnknownMessage(raw_id))?;
        let body = &bytes[2..];

        Ok(match id {
            MsgId::Ping => HostMessage::Ping(Handle::decode(body)?),
            MsgId::Pong => HostMessage::Pong(Handle::decode(body)?),
            MsgId::Heartbeat => HostMessage::Heartbeat,
            MsgId::Request => HostMessage::Request(RequestBody::decode(body)?),
            MsgId::Reject => {
                if body.len() < 2 {
                    return Err(Error::Truncated);
                }
                let raw_reason = u16::from_be_bytes(body[0..2].try_into().unwrap());
                let reason = RejectReason::try_from(raw_reason)
                    .map_err(|_| Error::UnknownMessage(raw_reason))?;
                HostMessage::Reject(reason)
            }
            MsgId::Response => {
                if body.len() < RESPONSE_HEADER_LEN {
                    return Err(Error::Truncated);
                }

                let length = u16::from_be_bytes(body[0..2].try_into().unwrap()) as usize;
                let mut nickname = [0u8; NICKNAME_LEN];
                nickname.copy_from_slice(&body[2..RESPONSE_HEADER_LEN]);

                let expected = RESPONSE_HEADER_LEN + length * RESPONSE_FRAGMENT_LEN;
                if body.len() != expected {
                    return Err(Error::LengthMismatch);
                }

                let mut fragments = Vec::with_capacity(length);
                let mut offset = RESPONSE_HEADER_LEN;
                for _ in 0..length {
                    fragments.push(ResponseFragment::decode(&body[offset..])?);
                    offset += RESPONSE_FRAGMENT_LEN;
                }

                HostMessage::Response {
                    nickname,
                    fragments,
                }
            }
            MsgId::PingA => HostMessage::PingA(RequestBody::decode(body)?),
            MsgId::Join => {
                if body.len() != NICKNAME_LEN {
                    return Err(Error::LengthMismatch);
                }
                let mut nickname = [0u8; NICKNAME_LEN];
                nickname.copy_from_slice(&body[..NICKNAME_LEN]);
                HostMessage::Join(nickname)
            }
            MsgId::JoinOk => HostMessage::JoinOk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> RequestBody {
        RequestBody {
            gray: NetAddress::ipv4(192, 168, 1, 5, 48800),
            white: NetAddress::ipv4(203, 0, 113, 9, 55000),
            nickname: encode_nickname("alice"),
        }
    }

    #[test]
    fn every_message_kind_round_trips() {
        let messages = vec![
            HostMessage::Ping(Handle { index: 1, nonce: 2 }),
            HostMessage::Pong(Handle { index: 3, nonce: 4 }),
            HostMessage::Heartbeat,
            HostMessage::Request(sample_request()),
            HostMessage::Reject(RejectReason::AlreadyRegistered),
            HostMessage::Response {
                nickname: encode_nickname("master"),
                fragments: vec![ResponseFragment {
                    addresses: [
                        NetAddress::ipv4(198, 51, 100, 1, 1),
                        NetAddress::ipv4(198, 51, 100, 2, 2),
                        NetAddress::ipv4(198, 51, 100, 3, 3),
                    ],
                    nickname: encode_nickname("bob"),
                }],
            },
            HostMessage::PingA(sample_request()),
            HostMessage::Join(encode_nickname("carol")),
            HostMessage::JoinOk,
        ];

        for message in messages {
            let encoded = message.encode();
            let decoded = HostMessage::decode(&encoded).expect("round-trip decode");
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn response_with_disagreeing_length_field_is_rejected() {
        let mut bytes = BytesMut::new();
        bytes.put_u16(MsgId::Response.into());
        bytes.put_u16(1); // claims one fragment...
        bytes.put(&encode_nickname("master")[..]);
        // ...but the buffer ends here, with zero fragments actually present.

        assert_eq!(
            HostMessage::decode(&bytes),
            Err(Error::LengthMismatch)
        );
    }

    #[test]
    fn join_with_wrong_size_is_rejected_without_reading_out_of_bounds() {
        let mut bytes = BytesMut::new();
        bytes.put_u16(MsgId::Join.into());
        bytes.put_u8(0); // one byte short of a full nickname field

        assert_eq!(HostMessage::decode(&bytes), Err(Error::LengthMismatch));
    }

    #[test]
    fn unknown_message_id_is_rejected() {
        let mut bytes = BytesMut::new();
        bytes.put_u16(42);
        assert_eq!(HostMessage::decode(&bytes), Err(Error::UnknownMessage(42)));
    }
}

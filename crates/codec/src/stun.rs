//! STUN (RFC 5389) binding-discovery framing used by the NAT probe.
//!
//! This is a distinct wire format from [`crate::message`]: a 20-byte
//! header with a fixed magic cookie, followed by TLV attributes. Only the
//! attributes this crate's classifier actually reads are parsed; anything
//! else is skipped.

use crate::{Error, NetAddress};
use bytes::{BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const HEADER_LEN: usize = 20;
pub const TRANSACTION_ID_LEN: usize = 12;

pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_RESPONSE: u16 = 0x0101;

/// Flags packed into the last byte of a `CHANGE-REQUEST` attribute value.
pub const CHANGE_IP: u8 = 0x04;
pub const CHANGE_PORT: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum AttributeType {
    MappedAddress = 0x0001,
    ChangeRequest = 0x0003,
    ResponseOrigin = 0x802b,
    OtherAddress = 0x802c,
}

pub type TransactionId = [u8; TRANSACTION_ID_LEN];

/// Builds a STUN `Binding Request`, always carrying a `CHANGE-REQUEST`
/// attribute (its flag byte is `0` for a plain bind, matching the
/// reference classifier's behavior of never omitting the attribute).
///
/// # Test
///
/// ```
/// use rally_node_codec::stun::{encode_bind_request, MAGIC_COOKIE};
///
/// let buf = encode_bind_request([7u8; 12], false, false);
/// assert_eq!(&buf[0..2], &0x0001u16.to_be_bytes());
/// assert_eq!(&buf[4..8], &MAGIC_COOKIE.to_be_bytes());
/// assert_eq!(&buf[8..20], &[7u8; 12]);
/// // header (20) + CHANGE-REQUEST attribute header (4) + value (4)
/// assert_eq!(buf.len(), 28);
/// ```
pub fn encode_bind_request(
    transaction_id: TransactionId,
    change_ip: bool,
    change_port: bool,
) -> BytesMut {
    let mut bytes = BytesMut::with_capacity(32);
    bytes.put_u16(BINDING_REQUEST);
    bytes.put_u16(0);
    bytes.put_u32(MAGIC_COOKIE);
    bytes.put(&transaction_id[..]);

    let flags = (if change_ip { CHANGE_IP } else { 0 }) | (if change_port { CHANGE_PORT } else { 0 });
    bytes.put_u16(AttributeType::ChangeRequest as u16);
    bytes.put_u16(4);
    bytes.put_u32(flags as u32);

    let attr_len = (bytes.len() - HEADER_LEN) as u16;
    bytes[2..4].copy_from_slice(&attr_len.to_be_bytes());
    bytes
}

/// Attributes parsed out of a STUN `Binding Response` relevant to NAT
/// classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindResponse {
    pub mapped_address: Option<NetAddress>,
    pub response_origin: Option<NetAddress>,
    pub other_address: Option<NetAddress>,
}

/// Decodes and validates a STUN `Binding Response`.
///
/// Returns [`Error::TransactionMismatch`] (or another [`Error`] variant)
/// for anything that isn't a matching, well-formed response — per the
/// probe's send-loop contract, every such mismatch is simply discarded and
/// polling continues.
///
/// # Test
///
/// ```
/// use bytes::BytesMut;
/// use rally_node_codec::stun::{decode_bind_response, BINDING_RESPONSE, MAGIC_COOKIE};
/// use bytes::BufMut;
///
/// let txid = [9u8; 12];
/// let mut buf = BytesMut::new();
/// buf.put_u16(BINDING_RESPONSE);
/// buf.put_u16(12); // one MAPPED-ADDRESS attribute: 4 header + 8 value
/// buf.put_u32(MAGIC_COOKIE);
/// buf.put(&txid[..]);
/// buf.put_u16(0x0001); // MAPPED-ADDRESS
/// buf.put_u16(8);
/// buf.put_u8(0);
/// buf.put_u8(1);
/// buf.put_u16(48800);
/// buf.put_u32(u32::from_be_bytes([203, 0, 113, 5]));
///
/// let response = decode_bind_response(&buf, &txid).unwrap();
/// assert_eq!(response.mapped_address.unwrap().port, 48800);
/// ```
pub fn decode_bind_response(
    bytes: &[u8],
    expected_transaction_id: &TransactionId,
) -> Result<BindResponse, Error> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Truncated);
    }

    let msg_type = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
    if msg_type != BINDING_RESPONSE {
        return Err(Error::UnknownMessage(msg_type));
    }

    let declared_len = u16::from_be_bytes(bytes[2..4].try_into().unwrap()) as usize;
    if bytes.len() < HEADER_LEN + declared_len {
        return Err(Error::LengthMismatch);
    }

    if bytes[4..8] != MAGIC_COOKIE.to_be_bytes() {
        return Err(Error::NotFoundMagicNumber);
    }

    if &bytes[8..20] != &expected_transaction_id[..] {
        return Err(Error::TransactionMismatch);
    }

    let mut response = BindResponse::default();
    let mut offset = HEADER_LEN;
    let end = HEADER_LEN + declared_len;

    while end - offset >= 4 {
        let attr_type = u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap());
        let attr_len = u16::from_be_bytes(bytes[offset + 2..offset + 4].try_into().unwrap()) as usize;
        offset += 4;

        if end - offset < attr_len {
            break;
        }

        let value = &bytes[offset..offset + attr_len];
        if let Ok(kind) = AttributeType::try_from(attr_type) {
            match kind {
                AttributeType::MappedAddress => {
                    response.mapped_address = NetAddress::decode_stun_attr(value).ok();
                }
                AttributeType::ResponseOrigin => {
                    response.response_origin = NetAddress::decode_stun_attr(value).ok();
                }
                AttributeType::OtherAddress => {
                    response.other_address = NetAddress::decode_stun_attr(value).ok();
                }
                AttributeType::ChangeRequest => {}
            }
        }

        offset += attr_len + crate::alignment_32(attr_len);
    }

    Ok(response)
}

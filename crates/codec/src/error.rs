use std::fmt;

/// Decode/encode failures raised by the host protocol and STUN codecs.
///
/// Mirrors the reference stack's flat, `Debug`-derived error enum: no
/// `thiserror`, no nested causes, just a tag a caller can `match` on or log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Buffer too short for the structure being decoded.
    Truncated,
    /// A length field disagreed with the buffer's actual size.
    LengthMismatch,
    /// The leading message/method id did not match any known value.
    UnknownMessage(u16),
    /// A STUN attribute type code is not one this crate recognizes.
    UnknownAttribute(u16),
    /// The STUN magic cookie was missing or wrong.
    NotFoundMagicNumber,
    /// The STUN transaction id did not match the request that was sent.
    TransactionMismatch,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

use crate::Error;
use bytes::{BufMut, BytesMut};

/// Size, in bytes, of a [`Handle`] encoded on the wire.
pub const WIRE_LEN: usize = 8;

/// A generational reference into a [`Pool`](../../rally_node_engine/pool/struct.Pool.html):
/// a dense slot `index` plus an allocation `nonce`.
///
/// `nonce == 0` means invalid. Two handles compare equal iff both fields
/// match; a handle survives deletion of *other* entries but goes stale the
/// moment its own slot is deallocated and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Handle {
    pub index: u32,
    pub nonce: u32,
}

impl Handle {
    pub const INVALID: Handle = Handle { index: 0, nonce: 0 };

    pub fn is_valid(&self) -> bool {
        self.nonce != 0
    }

    /// Appends the 8-byte wire encoding of this handle.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use rally_node_codec::Handle;
    ///
    /// let mut buf = BytesMut::new();
    /// Handle { index: 3, nonce: 7 }.encode(&mut buf);
    /// assert_eq!(&buf[..], &[0, 0, 0, 3, 0, 0, 0, 7]);
    /// ```
    pub fn encode(&self, bytes: &mut BytesMut) {
        bytes.put_u32(self.index);
        bytes.put_u32(self.nonce);
    }

    /// Decodes the 8-byte wire encoding of a handle.
    ///
    /// # Test
    ///
    /// ```
    /// use rally_node_codec::Handle;
    ///
    /// let bytes = [0u8, 0, 0, 3, 0, 0, 0, 7];
    /// let handle = Handle::decode(&bytes).unwrap();
    /// assert_eq!(handle, Handle { index: 3, nonce: 7 });
    /// assert!(handle.is_valid());
    /// assert!(!Handle::INVALID.is_valid());
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < WIRE_LEN {
            return Err(Error::Truncated);
        }

        Ok(Self {
            index: u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
            nonce: u32::from_be_bytes(bytes[4..8].try_into().unwrap()),
        })
    }
}

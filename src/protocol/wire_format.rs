//! Byte layout of frame headers.
//!
//! Client to server frames start with a 5-byte header:
//! ```text
//! ┌──────────┬───────────┬─────────────┐
//! │ Length   │ Sender ID │ Payload     │
//! │ 4 bytes  │ 1 byte    │ Length - 1  │
//! │ uint32 BE│ uint8     │             │
//! └──────────┴───────────┴─────────────┘
//! ```
//!
//! Server to client frames carry only the length prefix, followed by the
//! raw response payload (no sender ID octet).
//!
//! All multi-byte integers are Big Endian.

use crate::error::{AgencyError, Result};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the sender ID octet on client frames.
pub const SENDER_ID_SIZE: usize = 1;

/// Outbound header size in bytes (length prefix + sender ID).
pub const OUTBOUND_HEADER_SIZE: usize = LENGTH_PREFIX_SIZE + SENDER_ID_SIZE;

/// Default maximum accepted response payload (1 MiB).
///
/// Real responses are 4 or 8 bytes; anything near this is a desynchronized stream.
pub const DEFAULT_MAX_RESPONSE_SIZE: u32 = 1024 * 1024;

/// Header of a client to server frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundHeader {
    /// Byte count of everything after the length prefix (`1 + payload`).
    pub length: u32,
    /// Agency identifier of the sending client.
    pub sender_id: u8,
}

impl OutboundHeader {
    /// Create a header for a payload of `payload_len` bytes.
    ///
    /// Fails when `1 + payload_len` does not fit the `u32` length prefix.
    pub fn new(sender_id: u8, payload_len: usize) -> Result<Self> {
        let length = payload_len
            .checked_add(SENDER_ID_SIZE)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                AgencyError::Protocol(format!(
                    "payload of {payload_len} bytes does not fit a u32 length prefix"
                ))
            })?;
        Ok(Self { length, sender_id })
    }

    /// Payload bytes following the sender ID.
    #[inline]
    pub fn payload_length(&self) -> usize {
        (self.length as usize).saturating_sub(SENDER_ID_SIZE)
    }

    /// Header bytes as written before the payload.
    ///
    /// # Example
    ///
    /// ```
    /// use agency_client::protocol::OutboundHeader;
    ///
    /// let header = OutboundHeader::new(3, 8).unwrap();
    /// assert_eq!(header.encode(), [0, 0, 0, 9, 3]);
    /// ```
    pub fn encode(&self) -> [u8; OUTBOUND_HEADER_SIZE] {
        let mut buf = [0u8; OUTBOUND_HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Write the header into the first five bytes of `buf`, which must be long enough.
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= OUTBOUND_HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4] = self.sender_id;
    }

    /// Read a header from the front of `buf`, if it holds five bytes.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < OUTBOUND_HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: decode_length_prefix(buf)?,
            sender_id: buf[4],
        })
    }
}

/// Big-endian length prefix of a server frame.
#[inline]
pub fn encode_length_prefix(length: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    length.to_be_bytes()
}

/// Length prefix at the front of `buf`, if four bytes are there.
#[inline]
pub fn decode_length_prefix(buf: &[u8]) -> Option<u32> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = buf.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = OutboundHeader::new(7, 120).unwrap();
        let decoded = OutboundHeader::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(decoded.payload_length(), 120);
    }

    #[test]
    fn test_length_counts_sender_id_and_payload() {
        let header = OutboundHeader::new(1, 0).unwrap();
        assert_eq!(header.length, 1);
        assert_eq!(header.payload_length(), 0);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = OutboundHeader {
            length: 0x0102_0304,
            sender_id: 0x05,
        };
        assert_eq!(header.encode(), [0x01, 0x02, 0x03, 0x04, 0x05]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(OutboundHeader::decode(&[0, 0, 0, 1]).is_none());
        assert!(decode_length_prefix(&[0, 0, 1]).is_none());
    }

    #[test]
    fn test_length_prefix_helpers() {
        let bytes = encode_length_prefix(0xDEAD_BEEF);
        assert_eq!(bytes, [0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(decode_length_prefix(&bytes), Some(0xDEAD_BEEF));
    }

    #[test]
    fn test_oversize_payload_rejected() {
        let result = OutboundHeader::new(1, u32::MAX as usize);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not fit"));
    }

    #[test]
    fn test_outbound_header_size() {
        assert_eq!(OUTBOUND_HEADER_SIZE, 5);
    }
}

//! Frames as they cross the wire.
//!
//! An inbound [`Frame`] is one length-prefixed response from the server.
//! Outbound frames are built from an [`OutboundHeader`] and a payload.
//!
//! # Example
//!
//! ```
//! use agency_client::protocol::{build_frame, OutboundHeader};
//!
//! let bytes = build_frame(4, b"\x04").unwrap();
//! assert_eq!(bytes, [0, 0, 0, 2, 4, 4]);
//! assert_eq!(OutboundHeader::decode(&bytes).unwrap().sender_id, 4);
//! ```

use bytes::Bytes;

use super::wire_format::{OutboundHeader, OUTBOUND_HEADER_SIZE};
use crate::error::Result;

/// A complete server to client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Response payload without its length prefix.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Build a complete client frame as a single byte vector.
///
/// Use `build_frame_parts` for scatter/gather I/O (writev).
pub fn build_frame(sender_id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let header = OutboundHeader::new(sender_id, payload.len())?;
    let mut buf = Vec::with_capacity(OUTBOUND_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Header bytes and the untouched payload, for a vectored write.
pub fn build_frame_parts(
    sender_id: u8,
    payload: &[u8],
) -> Result<([u8; OUTBOUND_HEADER_SIZE], &[u8])> {
    let header = OutboundHeader::new(sender_id, payload.len())?;
    Ok((header.encode(), payload))
}

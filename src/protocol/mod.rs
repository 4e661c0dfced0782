//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the length-prefixed framing of the wire protocol:
//! - 5-byte outbound header (length + sender ID)
//! - Frame buffer for accumulating partial reads of server frames
//! - Frame builders for contiguous and scatter/gather writes

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, build_frame_parts, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    decode_length_prefix, encode_length_prefix, OutboundHeader, DEFAULT_MAX_RESPONSE_SIZE,
    LENGTH_PREFIX_SIZE, OUTBOUND_HEADER_SIZE, SENDER_ID_SIZE,
};

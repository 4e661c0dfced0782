//! Reassembly of server frames (`u32 length ‖ payload`) from arbitrary reads.
//!
//! A read may end anywhere: inside the length prefix, inside a payload, or
//! after several whole responses. Bytes are kept in a `BytesMut` until a
//! frame completes; payloads are split off without copying.
//!
//! # Example
//!
//! ```
//! use agency_client::protocol::FrameBuffer;
//!
//! let mut responses = FrameBuffer::new();
//! assert!(responses.push(&[0, 0]).unwrap().is_empty());
//! let frames = responses.push(&[0, 4, 0, 0, 0, 1]).unwrap();
//! assert_eq!(frames[0].payload(), &[0, 0, 0, 1]);
//! ```

use bytes::{Buf, Bytes, BytesMut};

use super::wire_format::{decode_length_prefix, DEFAULT_MAX_RESPONSE_SIZE, LENGTH_PREFIX_SIZE};
use super::Frame;
use crate::error::{AgencyError, Result};

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForLength,
    /// Prefix consumed; `remaining` payload bytes still to come.
    WaitingForPayload { remaining: u32 },
}

/// Incremental parser for server frames.
#[derive(Debug)]
pub struct FrameBuffer {
    pending: BytesMut,
    state: State,
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Parser accepting responses up to 1 MiB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_RESPONSE_SIZE)
    }

    /// Parser rejecting any declared payload longer than `max_payload_size`.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            pending: BytesMut::with_capacity(64),
            state: State::WaitingForLength,
            max_payload_size,
        }
    }

    /// Feed the bytes of one read; returns every frame they complete, in order.
    ///
    /// A declared length above the limit is a `Protocol` error.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.pending.extend_from_slice(data);

        let mut completed = Vec::new();
        while let Some(frame) = self.next_frame()? {
            completed.push(frame);
        }
        Ok(completed)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    let Some(length) = decode_length_prefix(&self.pending) else {
                        return Ok(None);
                    };
                    if length > self.max_payload_size {
                        return Err(AgencyError::Protocol(format!(
                            "response of {length} bytes exceeds maximum {}",
                            self.max_payload_size
                        )));
                    }

                    self.pending.advance(LENGTH_PREFIX_SIZE);
                    if length == 0 {
                        return Ok(Some(Frame::new(Bytes::new())));
                    }
                    self.state = State::WaitingForPayload { remaining: length };
                }
                State::WaitingForPayload { remaining } => {
                    let remaining = remaining as usize;
                    if self.pending.len() < remaining {
                        return Ok(None);
                    }

                    self.state = State::WaitingForLength;
                    let payload = self.pending.split_to(remaining).freeze();
                    return Ok(Some(Frame::new(payload)));
                }
            }
        }
    }

    /// Bytes held back for an incomplete frame.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether a frame has been started but not completed.
    pub fn has_partial_frame(&self) -> bool {
        !self.pending.is_empty() || matches!(self.state, State::WaitingForPayload { .. })
    }

    #[cfg(test)]
    fn awaiting_payload(&self) -> bool {
        matches!(self.state, State::WaitingForPayload { .. })
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

//! Response codec.
//!
//! The server sends two response shapes with no tag to tell them apart:
//! - `BatchAck`: `batchID:u32, acceptedCount:u32` (8 bytes)
//! - `WinnerResult`: `winnerCount:u32` (4 bytes)
//!
//! The caller picks the decoder with [`ExpectedResponse`], derived from the
//! request that is outstanding.

use bytes::Bytes;

use crate::error::{AgencyError, Result};

/// Acknowledgment of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchAck {
    pub batch_id: u32,
    pub accepted: u32,
}

impl BatchAck {
    /// Encoded size in bytes.
    pub const SIZE: usize = 8;

    pub fn new(batch_id: u32, accepted: u32) -> Self {
        Self { batch_id, accepted }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = [0u8; BatchAck::SIZE];
        buf[..4].copy_from_slice(&self.batch_id.to_be_bytes());
        buf[4..].copy_from_slice(&self.accepted.to_be_bytes());
        Bytes::copy_from_slice(&buf)
    }

    /// Decode from the first 8 bytes; extra bytes are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let bytes = fixed::<{ BatchAck::SIZE }>("batch ack", buf)?;
        Ok(Self {
            batch_id: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            accepted: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// Number of winners drawn for this agency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinnerResult {
    pub winners: u32,
}

impl WinnerResult {
    /// Encoded size in bytes.
    pub const SIZE: usize = 4;

    pub fn new(winners: u32) -> Self {
        Self { winners }
    }

    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.winners.to_be_bytes())
    }

    /// Decode from the first 4 bytes; extra bytes are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let bytes = fixed::<{ WinnerResult::SIZE }>("winner result", buf)?;
        Ok(Self {
            winners: u32::from_be_bytes(bytes),
        })
    }
}

fn fixed<const N: usize>(kind: &'static str, buf: &[u8]) -> Result<[u8; N]> {
    buf.get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or(AgencyError::TruncatedResponse {
            kind,
            expected: N,
            actual: buf.len(),
        })
}

/// Which response shape answers the outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedResponse {
    /// A batch was sent.
    BatchAck,
    /// The finish notification was sent.
    WinnerResult,
}

/// A decoded server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    BatchAck(BatchAck),
    WinnerResult(WinnerResult),
}

impl ExpectedResponse {
    /// Decode `payload` as this response shape.
    ///
    /// # Example
    ///
    /// ```
    /// use agency_client::codec::{ExpectedResponse, Response, WinnerResult};
    ///
    /// let response = ExpectedResponse::WinnerResult.decode(&[0, 0, 0, 1]).unwrap();
    /// assert_eq!(response, Response::WinnerResult(WinnerResult::new(1)));
    /// ```
    pub fn decode(self, payload: &[u8]) -> Result<Response> {
        match self {
            ExpectedResponse::BatchAck => BatchAck::decode(payload).map(Response::BatchAck),
            ExpectedResponse::WinnerResult => {
                WinnerResult::decode(payload).map(Response::WinnerResult)
            }
        }
    }
}

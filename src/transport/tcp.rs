//! Length-prefixed message transport over a byte stream.
//!
//! [`Connection`] owns the stream for its whole lifetime. Writes loop until
//! every byte is accepted, reads loop until a whole frame is buffered, so
//! short reads and short writes never surface to callers.
//!
//! # Example
//!
//! ```ignore
//! use agency_client::transport::Connection;
//!
//! let mut conn = Connection::connect("127.0.0.1:12345", 1).await?;
//! conn.send_message(&payload).await?;
//! let response = conn.receive_message().await?;
//! conn.close().await;
//! ```

use std::collections::VecDeque;
use std::io::IoSlice;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{AgencyError, Result};
use crate::protocol::{build_frame_parts, Frame, FrameBuffer};

/// Size of the socket read buffer.
const READ_BUFFER_SIZE: usize = 4 * 1024;

/// A framed, exclusively owned connection to the server.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    sender_id: u8,
    frames: FrameBuffer,
    ready: VecDeque<Frame>,
    read_buf: Vec<u8>,
}

impl Connection<TcpStream> {
    /// Open a TCP connection to `addr`.
    ///
    /// Fails with `AgencyError::Connection`; no retry is attempted.
    pub async fn connect(addr: &str, sender_id: u8) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(AgencyError::Connection)?;
        // Requests are small and strictly alternate with responses.
        stream.set_nodelay(true).map_err(AgencyError::Connection)?;
        Ok(Self::new(stream, sender_id))
    }

    /// Address of the server end.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }
}

impl<S> Connection<S> {
    /// Wrap an already-open stream.
    pub fn new(stream: S, sender_id: u8) -> Self {
        Self {
            stream,
            sender_id,
            frames: FrameBuffer::new(),
            ready: VecDeque::new(),
            read_buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    /// Replace the inbound frame parser (e.g. to change the size limit).
    pub fn with_frame_buffer(mut self, frames: FrameBuffer) -> Self {
        self.frames = frames;
        self
    }

    /// Sender ID stamped on every outbound frame.
    pub fn sender_id(&self) -> u8 {
        self.sender_id
    }
}

impl<S: AsyncWrite + Unpin> Connection<S> {
    /// Send one client frame: `length:u32 ‖ senderID:u8 ‖ payload`.
    pub async fn send_message(&mut self, payload: &[u8]) -> Result<()> {
        let (header, payload) = build_frame_parts(self.sender_id, payload)?;
        write_all_parts(&mut self.stream, &[&header[..], payload])
            .await
            .map_err(AgencyError::Connection)
    }

    /// Shut the connection down. Failures are logged, not returned.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "connection shutdown failed");
        }
    }
}

impl<S: AsyncRead + Unpin> Connection<S> {
    /// Receive one server frame and return its payload.
    ///
    /// End of stream before a whole frame is read is a connection error.
    pub async fn receive_message(&mut self) -> Result<Bytes> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame.payload);
            }

            let n = self
                .stream
                .read(&mut self.read_buf)
                .await
                .map_err(AgencyError::Connection)?;
            if n == 0 {
                return Err(AgencyError::unexpected_eof(
                    self.frames.has_partial_frame(),
                    self.frames.len(),
                ));
            }

            self.ready.extend(self.frames.push(&self.read_buf[..n])?);
        }
    }
}

/// Write every byte of `parts`, in order.
///
/// Tries a single vectored write first, then keeps writing whatever is left
/// after each short write.
async fn write_all_parts<W>(writer: &mut W, parts: &[&[u8]]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = parts.iter().map(|p| p.len()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = remaining_slices(parts, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            ));
        }
        total_written += written;
    }

    writer.flush().await
}

/// IoSlices for the bytes of `parts` after the first `skip_bytes`.
fn remaining_slices<'a>(parts: &[&'a [u8]], skip_bytes: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(parts.len());
    let mut start = 0;

    for part in parts {
        let end = start + part.len();
        if skip_bytes < end {
            slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(start)..]));
        }
        start = end;
    }

    slices
}

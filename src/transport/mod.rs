//! Transport module - the framing layer over TCP.
//!
//! [`Connection`] is generic over any `AsyncRead + AsyncWrite` stream;
//! [`Connection::connect`] dials a TCP server.

mod tcp;

pub use tcp::Connection;

//! Error types for agency-client.

use thiserror::Error;

/// Main error type for all agency-client operations.
#[derive(Debug, Error)]
pub enum AgencyError {
    /// Dial, read or write failure on the server connection.
    #[error("connection error: {0}")]
    Connection(#[source] std::io::Error),

    /// Local I/O error (record source file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while reading a configuration file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A length prefix or fixed-width field would read past the end of the buffer.
    #[error("malformed record: `{field}` needs {needed} bytes, {available} available")]
    MalformedRecord {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    /// A length-prefixed text field does not fit its one-byte prefix.
    #[error("field `{field}` is {len} bytes long, maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A numeric text field is not a decimal number in range.
    #[error("field `{field}` is not a valid number: {value:?}")]
    InvalidNumericField { field: &'static str, value: String },

    /// Birth date is not a 10-byte `YYYY-MM-DD` value.
    #[error("invalid birth date {0:?}, expected YYYY-MM-DD")]
    InvalidBirthDate(String),

    /// Response payload shorter than the shape expected for the outstanding request.
    #[error("truncated {kind} response: expected {expected} bytes, got {actual}")]
    TruncatedResponse {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Input line does not carry exactly five comma-separated fields.
    #[error("line {line}: expected 5 fields, found {fields}")]
    InputFormat { line: u64, fields: usize },

    /// Input line is not UTF-8 text.
    #[error("line {line} is not valid UTF-8")]
    InvalidEncoding { line: u64 },

    /// Server acknowledged a different batch than the one in flight.
    #[error("acknowledgment mismatch: sent batch {expected}, server acknowledged {actual}")]
    UnexpectedAck { expected: u32, actual: u32 },

    /// Protocol error (oversize frame, trailing bytes, id overflow, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Missing or invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Shutdown was requested before the session finished.
    #[error("session cancelled")]
    Cancelled,
}

impl AgencyError {
    /// Whether this error rejects a single input record rather than the session.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            AgencyError::FieldTooLong { .. }
                | AgencyError::InvalidNumericField { .. }
                | AgencyError::InvalidBirthDate(_)
                | AgencyError::InvalidEncoding { .. }
        )
    }

    /// Connection error for an EOF while a response is outstanding.
    pub(crate) fn unexpected_eof(mid_frame: bool, buffered: usize) -> Self {
        let message = if mid_frame {
            format!("connection closed inside a response frame, {buffered} bytes buffered")
        } else {
            "connection closed before the response arrived".to_string()
        };
        AgencyError::Connection(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            message,
        ))
    }
}

/// Result type alias using AgencyError.
pub type Result<T> = std::result::Result<T, AgencyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_errors_are_classified() {
        let too_long = AgencyError::FieldTooLong {
            field: "first_name",
            len: 300,
            max: 255,
        };
        let numeric = AgencyError::InvalidNumericField {
            field: "document",
            value: "abc".to_string(),
        };
        assert!(too_long.is_record_error());
        assert!(numeric.is_record_error());
        assert!(AgencyError::InvalidBirthDate("1990".to_string()).is_record_error());
        assert!(AgencyError::InvalidEncoding { line: 2 }.is_record_error());
    }

    #[test]
    fn test_session_errors_are_not_record_errors() {
        assert!(!AgencyError::Cancelled.is_record_error());
        assert!(!AgencyError::unexpected_eof(true, 3).is_record_error());
        assert!(!AgencyError::TruncatedResponse {
            kind: "batch ack",
            expected: 8,
            actual: 2,
        }
        .is_record_error());
    }

    #[test]
    fn test_unexpected_eof_is_connection_error() {
        match AgencyError::unexpected_eof(true, 7) {
            AgencyError::Connection(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof);
                assert!(e.to_string().contains("7 bytes"));
            }
            other => panic!("unexpected error: {other}"),
        }
        match AgencyError::unexpected_eof(false, 0) {
            AgencyError::Connection(e) => {
                assert!(e.to_string().contains("before the response"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

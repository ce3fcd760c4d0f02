//! Error types for the CoE gateway.
//!
//! Decode-time errors are local and non-fatal by design: a malformed datagram
//! is discarded without touching any state, and nothing is delivered to
//! subscribers. Unknown unit ids and encode range overflows are deliberately
//! *not* errors — the former degrades to a zero-decimal sentinel unit, the
//! latter clamps and surfaces as a soft [`EncodeWarning`](crate::codec::v1::EncodeWarning).

use thiserror::Error;

/// Errors produced by the CoE gateway.
#[derive(Debug, Error)]
pub enum CoeError {
    /// Datagram size does not match what the protocol version requires.
    #[error("datagram length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// V2 header version bytes do not read 2.0.
    #[error("unsupported protocol version {low}.{high} (expected 2.0)")]
    VersionMismatch { low: u8, high: u8 },

    /// More entries than fit in a single V2 datagram.
    ///
    /// Callers with larger output sets split across multiple datagrams,
    /// e.g. via [`encode_chunked`](crate::codec::v2::encode_chunked).
    #[error("too many entries for one V2 datagram: {count} (max 16)")]
    TooManyEntries { count: usize },

    /// Sending a packet through the transport collaborator failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Caller-supplied input could not be interpreted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Underlying socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoeError::LengthMismatch {
            expected: 14,
            actual: 13,
        };
        assert_eq!(
            err.to_string(),
            "datagram length mismatch: expected 14 bytes, got 13"
        );

        let err = CoeError::VersionMismatch { low: 1, high: 3 };
        assert!(err.to_string().contains("1.3"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        let err: CoeError = io.into();
        assert!(matches!(err, CoeError::Io(_)));
    }
}

//! Codec error types and the wire error payload.

use thiserror::Error;

use crate::frame::HEADER_LEN;

/// Errors raised while encoding or decoding a frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input shorter than the fixed header.
    #[error("frame too short: {len} bytes, header needs {HEADER_LEN}")]
    FrameTooShort {
        /// Bytes actually received.
        len: usize,
    },

    /// `hasError` or `isEnd` holding something other than 0 or 1.
    #[error("invalid {field} flag: {value}")]
    InvalidFlag {
        /// Header field name.
        field: &'static str,
        /// Value found on the wire.
        value: u16,
    },

    /// Error-flagged frame without room for the 4-byte error code.
    #[error("malformed error body: {len} bytes, need at least 4")]
    MalformedErrorBody {
        /// Payload bytes after the header.
        len: usize,
    },

    /// Request id of the wrong width.
    #[error("request id must be 36 bytes, got {len}")]
    InvalidRequestId {
        /// Length supplied.
        len: usize,
    },

    /// Payload serialization failed.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Payload bytes did not match the registered prototype.
    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Error payload of a frame with `hasError = 1`: numeric code plus message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct WireError {
    /// Machine-readable code.
    pub code: u32,
    /// Human-readable message (UTF-8 on the wire).
    pub message: String,
}

impl WireError {
    /// Build a wire error.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

//! Protocol error types.

use thiserror::Error;

/// Result alias for wire-level operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload was not valid JSON for the expected message.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A single stream line exceeded the frame size limit.
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Bytes buffered without a newline.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The server terminated the stream with an error envelope.
    #[error("stream ended with error {code}: {message}")]
    EndOfStream {
        /// Connect error code (e.g. `not_found`).
        code: String,
        /// Human readable message.
        message: String,
    },
}

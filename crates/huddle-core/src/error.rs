//! Error types for the client core.

use huddle_proto::ProtocolError;
use thiserror::Error;

/// Failures of a key/value backend.
///
/// These never reach identity store callers: the store logs them and falls
/// back to process memory.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database file could not be opened or created.
    #[error("failed to open store: {0}")]
    Open(#[from] redb::DatabaseError),

    /// Transaction could not be started.
    #[error("transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table could not be opened.
    #[error("table unavailable: {0}")]
    Table(#[from] redb::TableError),

    /// Read or write hit the storage layer.
    #[error("storage I/O failed: {0}")]
    Io(#[from] redb::StorageError),

    /// Commit was rejected.
    #[error("commit failed: {0}")]
    Commit(#[from] redb::CommitError),
}

/// Failures of a remote call or stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The authority rejected the request. The message is shown verbatim.
    #[error("{message}")]
    Rpc {
        /// Connect error code, e.g. `not_found`.
        code: String,
        /// Human readable message.
        message: String,
    },

    /// The request never produced a response.
    #[error("{0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The stream finished without an error frame.
    #[error("stream ended")]
    StreamEnded,
}

impl ServiceError {
    /// Shorthand for an authority rejection.
    pub fn rpc(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rpc { code: code.into(), message: message.into() }
    }
}

impl From<ProtocolError> for ServiceError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::EndOfStream { code, message } => Self::Rpc { code, message },
            other => Self::Decode(other.to_string()),
        }
    }
}

/// Rejections of a custom card deck. Messages are user facing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CardError {
    /// Input was blank.
    #[error("Enter at least 2 card values")]
    Empty,

    /// A value exceeds the length limit.
    #[error("Card \"{0}\" is too long (max 10 chars)")]
    TooLong(String),

    /// Fewer than two distinct values.
    #[error("At least 2 cards are required")]
    TooFew,

    /// More than fifteen distinct values.
    #[error("Maximum 15 cards allowed")]
    TooMany,
}

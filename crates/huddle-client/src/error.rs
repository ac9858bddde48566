//! Client error types.

use huddle_core::ServiceError;
use thiserror::Error;

/// Errors returned by [`crate::RoomClient::create_room`] and
/// [`crate::RoomClient::join_room`].
///
/// Every other action records its failure on the engine view instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The remote call failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The authority answered without a room.
    #[error("the server did not return a room")]
    MissingRoom,

    /// The background task is gone.
    #[error("client stopped")]
    Stopped,
}

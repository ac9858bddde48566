//! Remote service contracts.
//!
//! The engines talk to the authority only through these traits. The HTTP
//! transport and the in-memory test authority both implement them.

use async_trait::async_trait;
use futures::stream::BoxStream;
use huddle_proto::{
    RoomEvent, VoteEvent,
    rpc::{
        CastVoteRequest, CreateRoomRequest, GetRoomRequest, GetRoomResponse, JoinRoomRequest,
        KickParticipantRequest, ParticipantRequest, RevealVotesResponse, SeatResponse,
        SetTopicRequest, TransferOwnershipRequest, WatchRequest,
    },
};

use crate::error::ServiceError;

/// A server-pushed event stream. Ends with `None` or an error item.
pub type EventStream<T> = BoxStream<'static, Result<T, ServiceError>>;

/// Room lifecycle and membership.
#[async_trait]
pub trait RoomService: Send + Sync + 'static {
    /// Create a room with the caller as host.
    async fn create_room(&self, request: CreateRoomRequest) -> Result<SeatResponse, ServiceError>;

    /// Join a room, or reclaim the seat held by the session token.
    async fn join_room(&self, request: JoinRoomRequest) -> Result<SeatResponse, ServiceError>;

    /// Leave a room.
    async fn leave_room(&self, request: ParticipantRequest) -> Result<(), ServiceError>;

    /// Fetch a room snapshot.
    async fn get_room(&self, request: GetRoomRequest) -> Result<GetRoomResponse, ServiceError>;

    /// Remove a participant. Host only.
    async fn kick_participant(&self, request: KickParticipantRequest) -> Result<(), ServiceError>;

    /// Hand host privileges to another participant. Host only.
    async fn transfer_ownership(
        &self,
        request: TransferOwnershipRequest,
    ) -> Result<(), ServiceError>;

    /// Open the room event stream.
    async fn watch_room(&self, request: WatchRequest) -> Result<EventStream<RoomEvent>, ServiceError>;
}

/// Voting rounds.
#[async_trait]
pub trait EstimationService: Send + Sync + 'static {
    /// Begin a voting round.
    async fn start_round(&self, request: ParticipantRequest) -> Result<(), ServiceError>;

    /// Cast or replace the caller's vote.
    async fn cast_vote(&self, request: CastVoteRequest) -> Result<(), ServiceError>;

    /// Reveal the round. Host only.
    async fn reveal_votes(
        &self,
        request: ParticipantRequest,
    ) -> Result<RevealVotesResponse, ServiceError>;

    /// Clear the round. Host only.
    async fn reset_round(&self, request: ParticipantRequest) -> Result<(), ServiceError>;

    /// Change the topic. Host only.
    async fn set_topic(&self, request: SetTopicRequest) -> Result<(), ServiceError>;

    /// Open the vote event stream.
    async fn watch_votes(&self, request: WatchRequest) -> Result<EventStream<VoteEvent>, ServiceError>;
}

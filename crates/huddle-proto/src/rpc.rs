//! Request and response bodies of the room and estimation services.

use serde::{Deserialize, Serialize};

use crate::{
    estimation::VoteSummary,
    room::{CardConfig, Room},
};

/// Every remote method, with its HTTP path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Room service: create.
    CreateRoom,
    /// Room service: join or reclaim.
    JoinRoom,
    /// Room service: leave.
    LeaveRoom,
    /// Room service: fetch snapshot.
    GetRoom,
    /// Room service: event stream.
    WatchRoom,
    /// Room service: remove a participant.
    KickParticipant,
    /// Room service: move host privileges.
    TransferOwnership,
    /// Estimation service: begin voting.
    StartRound,
    /// Estimation service: vote.
    CastVote,
    /// Estimation service: reveal.
    RevealVotes,
    /// Estimation service: reset.
    ResetRound,
    /// Estimation service: topic.
    SetTopic,
    /// Estimation service: event stream.
    WatchVotes,
}

impl Method {
    const ROOM_SERVICE: &'static str = "esteemed.v1.RoomService";
    const ESTIMATION_SERVICE: &'static str = "esteemed.v1.EstimationService";

    /// Fully qualified service name.
    pub fn service(self) -> &'static str {
        match self {
            Self::CreateRoom
            | Self::JoinRoom
            | Self::LeaveRoom
            | Self::GetRoom
            | Self::WatchRoom
            | Self::KickParticipant
            | Self::TransferOwnership => Self::ROOM_SERVICE,
            Self::StartRound
            | Self::CastVote
            | Self::RevealVotes
            | Self::ResetRound
            | Self::SetTopic
            | Self::WatchVotes => Self::ESTIMATION_SERVICE,
        }
    }

    /// Method name as routed by the server.
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateRoom => "CreateRoom",
            Self::JoinRoom => "JoinRoom",
            Self::LeaveRoom => "LeaveRoom",
            Self::GetRoom => "GetRoom",
            Self::WatchRoom => "WatchRoom",
            Self::KickParticipant => "KickParticipant",
            Self::TransferOwnership => "TransferOwnership",
            Self::StartRound => "StartRound",
            Self::CastVote => "CastVote",
            Self::RevealVotes => "RevealVotes",
            Self::ResetRound => "ResetRound",
            Self::SetTopic => "SetTopic",
            Self::WatchVotes => "WatchVotes",
        }
    }

    /// `/<service>/<method>`.
    pub fn path(self) -> String {
        format!("/{}/{}", self.service(), self.name())
    }

    /// Whether the method returns a server stream.
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::WatchRoom | Self::WatchVotes)
    }
}

/// Create a room with the caller as host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Host display name.
    pub host_name: String,
    /// Caller identity token.
    pub session_token: String,
    /// Deck; the server defaults to Fibonacci.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_config: Option<CardConfig>,
}

/// Join, or reclaim a seat when the token already has one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Room id or durable name.
    pub room_id: String,
    /// Display name; empty reuses the reclaimed seat's name.
    pub participant_name: String,
    /// Caller identity token.
    pub session_token: String,
    /// Join without voting rights.
    #[serde(default)]
    pub is_spectator: bool,
}

/// Answer to create and join: the room and the caller's seat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatResponse {
    /// Room snapshot.
    #[serde(default)]
    pub room: Option<Room>,
    /// Caller's participant id.
    #[serde(default)]
    pub participant_id: String,
}

/// Addresses an action by a seated participant.
///
/// Used by leave, start, reveal and reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRequest {
    /// Room id.
    pub room_id: String,
    /// Acting participant.
    pub participant_id: String,
    /// Caller identity token.
    pub session_token: String,
}

/// Fetch a room snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRoomRequest {
    /// Room id or durable name.
    pub room_id: String,
}

/// Room snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRoomResponse {
    /// Absent when the room is unknown.
    #[serde(default)]
    pub room: Option<Room>,
}

/// Open a room or vote event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    /// Room id.
    pub room_id: String,
    /// Caller identity token.
    pub session_token: String,
}

/// Remove another participant (host only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickParticipantRequest {
    /// Acting participant.
    #[serde(flatten)]
    pub actor: ParticipantRequest,
    /// Who to remove.
    pub target_participant_id: String,
}

/// Hand host privileges to another participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOwnershipRequest {
    /// Acting participant.
    #[serde(flatten)]
    pub actor: ParticipantRequest,
    /// New host.
    pub new_host_id: String,
}

/// Cast or replace the caller's vote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    /// Acting participant.
    #[serde(flatten)]
    pub actor: ParticipantRequest,
    /// Card value.
    pub value: String,
}

/// Reveal answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealVotesResponse {
    /// Authority-computed summary.
    #[serde(default)]
    pub summary: Option<VoteSummary>,
}

/// Set the topic under estimation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTopicRequest {
    /// Acting participant.
    #[serde(flatten)]
    pub actor: ParticipantRequest,
    /// New topic.
    pub topic: String,
}

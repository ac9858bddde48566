//! Room synchronization engine.
//!
//! # Architecture: Action-Based State Machine
//!
//! The engine owns the local [`RoomView`] and never performs I/O. Remote
//! actions are split in two halves:
//!
//! - a request builder (`*_request`) that gates the action on local role and
//!   identifiers and returns `None` when the action is a no-op
//! - a completion handler called with the outcome of the remote call
//!
//! Effects outside the view (identity store writes, opening or closing the
//! event stream) are returned as [`RoomAction`]s for the runtime to execute.
//!
//! # Precedence
//!
//! The event stream is authoritative. `startRound` writes the new phase
//! optimistically; the matching `stateChanged` event overwrites it with the
//! same value. Kicks and host transfers are never applied optimistically.
//!
//! # Leaving
//!
//! A `participantLeft` event naming the local participant means one of two
//! things. If a leave request is in flight, it is the echo of our own leave
//! and is ignored. Otherwise we were removed: the room mapping is cleared and
//! the view shows [`KICKED_MESSAGE`].

use huddle_proto::{
    Participant, Room, RoomEvent, RoomState,
    rpc::{
        GetRoomRequest, KickParticipantRequest, ParticipantRequest, SetTopicRequest,
        TransferOwnershipRequest, WatchRequest,
    },
};
use tracing::{debug, info, warn};

/// Error shown after being removed by the host.
pub const KICKED_MESSAGE: &str = "You have been removed from the room";

/// Effects requested by the room engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomAction {
    /// Persist the seat held in `room` for silent rejoin.
    SaveParticipant {
        /// Durable room name.
        room: String,
        /// Seat to remember.
        participant_id: String,
    },
    /// Forget the seat held in `room`.
    ClearParticipant {
        /// Durable room name.
        room: String,
    },
    /// Record that `room` was entered.
    RecordVisit {
        /// Durable room name.
        room: String,
    },
    /// Open (or replace) the room event stream.
    Watch {
        /// Room id.
        room_id: String,
        /// Identity token.
        session_token: String,
    },
    /// Cancel the event stream.
    StopWatching,
    /// Stop the event stream for good; it must not be retried.
    Terminate,
}

/// Identifiers of a seated participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Seat {
    /// Room id.
    pub room_id: String,
    /// Participant id.
    pub participant_id: String,
    /// Identity token.
    pub session_token: String,
}

impl Seat {
    /// Whether every identifier is present.
    pub fn is_complete(&self) -> bool {
        !self.room_id.is_empty() && !self.participant_id.is_empty() && !self.session_token.is_empty()
    }

    /// Request body acting as this participant.
    pub fn request(&self) -> ParticipantRequest {
        ParticipantRequest {
            room_id: self.room_id.clone(),
            participant_id: self.participant_id.clone(),
            session_token: self.session_token.clone(),
        }
    }

    /// Request body for opening an event stream.
    pub fn watch_request(&self) -> WatchRequest {
        WatchRequest { room_id: self.room_id.clone(), session_token: self.session_token.clone() }
    }
}

/// Read-only room state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomView {
    /// Room snapshot, patched by events. `None` outside a room.
    pub room: Option<Room>,
    /// The local participant's id.
    pub participant_id: Option<String>,
    /// Identity token the seat was taken with.
    pub session_token: Option<String>,
    /// Whether the local participant is host.
    pub is_host: bool,
    /// Whether the local participant is a spectator.
    pub is_spectator: bool,
    /// Whether the room event stream is up.
    pub is_connected: bool,
    /// A create or join call is in flight.
    pub is_loading: bool,
    /// Last error, cleared by the next successful action.
    pub error: Option<String>,
}

impl RoomView {
    /// Participants of the held room.
    pub fn participants(&self) -> &[Participant] {
        self.room.as_ref().map_or(&[], |room| room.participants.as_slice())
    }

    /// Round phase, `Unspecified` outside a room.
    pub fn state(&self) -> RoomState {
        self.room.as_ref().map_or(RoomState::Unspecified, |room| room.state)
    }

    /// Topic under estimation.
    pub fn topic(&self) -> &str {
        self.room.as_ref().map_or("", |room| room.current_topic.as_str())
    }

    /// Durable name of the held room.
    pub fn room_name(&self) -> Option<&str> {
        self.room.as_ref().map(|room| room.name.as_str())
    }

    /// The local participant's record.
    pub fn me(&self) -> Option<&Participant> {
        let id = self.participant_id.as_deref()?;
        self.participants().iter().find(|p| p.id == id)
    }

    /// Participants who can vote.
    pub fn total_voters(&self) -> usize {
        self.participants().iter().filter(|p| !p.is_spectator).count()
    }

    /// Identifiers for acting in the room, when seated.
    pub fn seat(&self) -> Option<Seat> {
        let seat = Seat {
            room_id: self.room.as_ref()?.id.clone(),
            participant_id: self.participant_id.clone()?,
            session_token: self.session_token.clone()?,
        };
        seat.is_complete().then_some(seat)
    }
}

/// Room lifecycle state machine.
#[derive(Debug, Clone, Default)]
pub struct RoomEngine {
    view: RoomView,
    leaving: bool,
    stream_error: bool,
}

impl RoomEngine {
    /// Engine outside any room.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current view.
    pub fn view(&self) -> &RoomView {
        &self.view
    }

    /// Whether a voluntary leave is in flight.
    pub fn is_leaving(&self) -> bool {
        self.leaving
    }

    /// A create or join call started.
    pub fn request_started(&mut self) {
        self.view.is_loading = true;
        self.view.error = None;
        self.stream_error = false;
    }

    /// A create or join call failed.
    pub fn request_failed(&mut self, message: String) {
        self.view.is_loading = false;
        self.record_error(message);
    }

    /// A seat was taken, by create (`created`) or by join.
    ///
    /// The view is replaced wholesale. Host and spectator flags come from the
    /// participant record matching `participant_id`, except that the creator
    /// is always host.
    pub fn seated(
        &mut self,
        room: Room,
        participant_id: String,
        session_token: String,
        created: bool,
    ) -> Vec<RoomAction> {
        let me = room.participant(&participant_id);
        let is_host = created || me.is_some_and(|p| p.is_host);
        let is_spectator = !created && me.is_some_and(|p| p.is_spectator);
        info!(room = %room.name, participant = %participant_id, is_host, "entered room");

        let actions = vec![
            RoomAction::SaveParticipant {
                room: room.name.clone(),
                participant_id: participant_id.clone(),
            },
            RoomAction::RecordVisit { room: room.name.clone() },
            RoomAction::Watch { room_id: room.id.clone(), session_token: session_token.clone() },
        ];

        self.view = RoomView {
            room: Some(room),
            participant_id: Some(participant_id),
            session_token: Some(session_token),
            is_host,
            is_spectator,
            is_connected: true,
            is_loading: false,
            error: None,
        };
        self.leaving = false;
        self.stream_error = false;
        actions
    }

    /// Begin a voluntary leave. Sets the leave flag before the call goes out.
    pub fn leave_request(&mut self) -> Option<ParticipantRequest> {
        let request = self.view.seat()?.request();
        self.leaving = true;
        Some(request)
    }

    /// The leave call succeeded. The seat mapping is kept for a later rejoin.
    pub fn left(&mut self) -> Vec<RoomAction> {
        info!(room = ?self.view.room_name(), "left room");
        self.view = RoomView::default();
        self.leaving = false;
        self.stream_error = false;
        vec![RoomAction::StopWatching]
    }

    /// The leave call failed; the seat is still held.
    pub fn leave_failed(&mut self, message: String) {
        self.leaving = false;
        self.record_error(message);
    }

    /// Body for `StartRound`. Not gated on host; the authority decides.
    pub fn start_round_request(&self) -> Option<ParticipantRequest> {
        self.view.seat().map(|seat| seat.request())
    }

    /// `StartRound` succeeded in `room_id`: move to voting ahead of the event.
    ///
    /// A round started in a room this engine has since left is ignored.
    pub fn round_started(&mut self, room_id: &str) {
        if !self.is_in(room_id) {
            debug!(room = %room_id, "ignoring round start for a room no longer entered");
            return;
        }
        if let Some(room) = self.view.room.as_mut() {
            room.state = RoomState::Voting;
        }
        self.action_succeeded();
    }

    /// Whether the engine is currently in `room_id`.
    pub fn is_in(&self, room_id: &str) -> bool {
        self.view.room.as_ref().is_some_and(|room| room.id == room_id)
    }

    /// Body for `KickParticipant`. Host only.
    pub fn kick_request(&self, target_participant_id: &str) -> Option<KickParticipantRequest> {
        Some(KickParticipantRequest {
            actor: self.host_seat()?.request(),
            target_participant_id: target_participant_id.to_owned(),
        })
    }

    /// Body for `TransferOwnership`. Host only.
    pub fn transfer_request(&self, new_host_id: &str) -> Option<TransferOwnershipRequest> {
        Some(TransferOwnershipRequest {
            actor: self.host_seat()?.request(),
            new_host_id: new_host_id.to_owned(),
        })
    }

    /// Body for `SetTopic`. Host only.
    pub fn topic_request(&self, topic: &str) -> Option<SetTopicRequest> {
        Some(SetTopicRequest { actor: self.host_seat()?.request(), topic: topic.to_owned() })
    }

    /// Body for `GetRoom`.
    pub fn refresh_request(&self) -> Option<GetRoomRequest> {
        self.view.seat().map(|seat| GetRoomRequest { room_id: seat.room_id })
    }

    /// `GetRoom` answered. Overwrites the snapshot like a rejoin, keeping the
    /// seat.
    pub fn refreshed(&mut self, room: Option<Room>) {
        let Some(room) = room else {
            self.record_error("Room not found".to_owned());
            return;
        };
        if self.view.room.is_none() {
            return;
        }

        if let Some(me) = self.view.participant_id.as_deref().and_then(|id| room.participant(id)) {
            self.view.is_host = me.is_host;
            self.view.is_spectator = me.is_spectator;
        }
        self.view.room = Some(room);
        self.action_succeeded();
    }

    /// A fire-and-forget call succeeded; its effect arrives as an event.
    pub fn action_succeeded(&mut self) {
        if !self.stream_error {
            self.view.error = None;
        }
    }

    /// A call other than create or join failed.
    pub fn action_failed(&mut self, message: String) {
        self.record_error(message);
    }

    /// The event stream (re)opened.
    pub fn connected(&mut self) {
        if self.view.room.is_none() {
            return;
        }
        self.view.is_connected = true;
        if self.stream_error {
            self.view.error = None;
            self.stream_error = false;
        }
    }

    /// The event stream dropped and will be retried.
    pub fn disconnected(&mut self, error: String) {
        if self.view.room.is_none() {
            return;
        }
        self.view.is_connected = false;
        self.view.error = Some(error);
        self.stream_error = true;
    }

    /// Apply one server event.
    pub fn apply_event(&mut self, event: RoomEvent) -> Vec<RoomAction> {
        let Some(room) = self.view.room.as_mut() else {
            debug!(?event, "ignoring event outside a room");
            return Vec::new();
        };

        match event {
            RoomEvent::ParticipantJoined { participant: Some(participant) } => {
                debug!(participant = %participant.id, "participant joined");
                match room.participants.iter_mut().find(|p| p.id == participant.id) {
                    Some(existing) => *existing = participant,
                    None => room.participants.push(participant),
                }
            },
            RoomEvent::ParticipantJoined { participant: None } => {},
            RoomEvent::ParticipantLeft { participant_id } => {
                if self.view.participant_id.as_deref() != Some(participant_id.as_str()) {
                    debug!(participant = %participant_id, "participant left");
                    room.participants.retain(|p| p.id != participant_id);
                    return Vec::new();
                }
                if self.leaving {
                    debug!("own leave confirmed");
                    return Vec::new();
                }

                warn!(room = %room.name, "removed from room");
                let name = room.name.clone();
                self.view = RoomView { error: Some(KICKED_MESSAGE.to_owned()), ..RoomView::default() };
                self.stream_error = false;
                return vec![RoomAction::ClearParticipant { room: name }, RoomAction::StopWatching];
            },
            RoomEvent::HostChanged { new_host_id } => {
                debug!(host = %new_host_id, "host changed");
                for participant in &mut room.participants {
                    participant.is_host = participant.id == new_host_id;
                }
                self.view.is_host = self.view.participant_id.as_deref() == Some(new_host_id.as_str());
            },
            RoomEvent::StateChanged { new_state } => {
                debug!(state = new_state.as_str(), "state changed");
                room.state = new_state;
            },
            RoomEvent::TopicChanged { topic } => {
                room.current_topic = topic;
            },
            RoomEvent::RoomClosed { reason } => {
                warn!(room = %room.name, %reason, "room closed");
                let name = room.name.clone();
                self.view = RoomView { error: Some(format!("Room closed: {reason}")), ..RoomView::default() };
                self.leaving = false;
                self.stream_error = false;
                return vec![RoomAction::ClearParticipant { room: name }, RoomAction::Terminate];
            },
        }
        Vec::new()
    }

    fn host_seat(&self) -> Option<Seat> {
        if self.view.is_host { self.view.seat() } else { None }
    }

    fn record_error(&mut self, message: String) {
        self.view.error = Some(message);
        self.stream_error = false;
    }
}

//! In-memory remote authority.
//!
//! Implements [`RoomService`] and [`EstimationService`] over shared state so
//! several clients (tabs) can talk to the same rooms. Semantics follow the
//! production server closely enough for client tests:
//!
//! - a join whose session token already owns a seat reclaims that seat
//!   instead of adding a participant; an empty name keeps the old name
//! - leaving marks the participant disconnected and hands host to the
//!   earliest connected voter; the last leaver closes the room
//! - kicking removes the participant and their vote
//! - every mutation is broadcast to all live watchers of the room
//!
//! Fault hooks sever live streams and fail stream opens, which is enough to
//! drive the reconnect path deterministically.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use futures::StreamExt;
use huddle_core::{
    Environment, EstimationService, EventStream, RoomService, ServiceError, cards, generate_name,
};
use huddle_proto::{
    Method, Participant, Room, RoomEvent, RoomState, Vote, VoteEvent, VoteSummary,
    rpc::{
        CastVoteRequest, CreateRoomRequest, GetRoomRequest, GetRoomResponse, JoinRoomRequest,
        KickParticipantRequest, ParticipantRequest, RevealVotesResponse, SeatResponse,
        SetTopicRequest, TransferOwnershipRequest, WatchRequest,
    },
};
use tokio::sync::mpsc;
use tracing::debug;

type Sink<T> = mpsc::UnboundedSender<Result<T, ServiceError>>;

fn not_found() -> ServiceError {
    ServiceError::rpc("not_found", "room not found")
}

fn no_participant() -> ServiceError {
    ServiceError::rpc("not_found", "participant not found")
}

fn not_host() -> ServiceError {
    ServiceError::rpc("permission_denied", "only the host can perform this action")
}

fn invalid_state() -> ServiceError {
    ServiceError::rpc("failed_precondition", "invalid room state for this action")
}

struct Record {
    room: Room,
    tokens: HashMap<String, String>,
    votes: Vec<Vote>,
    room_sinks: Vec<Sink<RoomEvent>>,
    vote_sinks: Vec<Sink<VoteEvent>>,
}

impl Record {
    fn broadcast_room(&mut self, event: &RoomEvent) {
        self.room_sinks.retain(|sink| sink.send(Ok(event.clone())).is_ok());
    }

    fn broadcast_votes(&mut self, event: &VoteEvent) {
        self.vote_sinks.retain(|sink| sink.send(Ok(event.clone())).is_ok());
    }

    fn sever(&mut self) {
        let reset = || ServiceError::Transport("connection reset".to_owned());
        for sink in self.room_sinks.drain(..) {
            let _ = sink.send(Err(reset()));
        }
        for sink in self.vote_sinks.drain(..) {
            let _ = sink.send(Err(reset()));
        }
    }

    fn authorize(&self, request: &ParticipantRequest) -> Result<(), ServiceError> {
        match self.tokens.get(&request.participant_id) {
            Some(token) if *token == request.session_token => Ok(()),
            Some(_) => Err(ServiceError::rpc("unauthenticated", "invalid session token")),
            None => Err(no_participant()),
        }
    }

    fn authorize_host(&self, request: &ParticipantRequest) -> Result<(), ServiceError> {
        self.authorize(request)?;
        if self.room.participant(&request.participant_id).is_some_and(|p| p.is_host) {
            Ok(())
        } else {
            Err(not_host())
        }
    }

    fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.room.participants.iter_mut().find(|p| p.id == id)
    }

    fn seat_holder(&self, session_token: &str) -> Option<String> {
        if session_token.is_empty() {
            return None;
        }
        self.tokens.iter().find(|(_, token)| *token == session_token).map(|(id, _)| id.clone())
    }

    /// Earliest connected non-spectator, if the room has no host.
    fn promote_host(&mut self) -> Option<String> {
        if self.room.participants.iter().any(|p| p.is_host) {
            return None;
        }
        let next = self
            .room
            .participants
            .iter_mut()
            .filter(|p| p.is_connected && !p.is_spectator)
            .min_by_key(|p| p.joined_at)?;
        next.is_host = true;
        Some(next.id.clone())
    }

    fn summary(&self) -> VoteSummary {
        summarize(&self.votes)
    }
}

#[derive(Default)]
struct State {
    rooms: HashMap<String, Record>,
    names: HashMap<String, String>,
    next_id: u64,
    failing_opens: u32,
    calls: HashMap<Method, usize>,
}

impl State {
    fn room_id(&self, key: &str) -> Option<String> {
        if self.rooms.contains_key(key) {
            return Some(key.to_owned());
        }
        self.names.get(key).cloned()
    }

    fn record(&mut self, key: &str) -> Result<&mut Record, ServiceError> {
        let id = self.room_id(key).ok_or_else(not_found)?;
        self.rooms.get_mut(&id).ok_or_else(not_found)
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn close(&mut self, key: &str, reason: &str) -> bool {
        let Some(id) = self.room_id(key) else {
            return false;
        };
        let Some(mut record) = self.rooms.remove(&id) else {
            return false;
        };
        self.names.remove(&record.room.name);
        debug!(room = %record.room.name, reason, "closing room");
        record.broadcast_room(&RoomEvent::RoomClosed { reason: reason.to_owned() });
        true
    }

    fn take_failing_open(&mut self) -> bool {
        if self.failing_opens == 0 {
            return false;
        }
        self.failing_opens -= 1;
        true
    }
}

/// Shared in-memory implementation of both services.
///
/// Clones share state.
#[derive(Clone)]
pub struct MemoryAuthority {
    state: Arc<Mutex<State>>,
    env: Arc<dyn Environment>,
}

impl std::fmt::Debug for MemoryAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAuthority").finish_non_exhaustive()
    }
}

impl MemoryAuthority {
    /// Empty authority using `env` for timestamps and room names.
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self { state: Arc::new(Mutex::new(State::default())), env }
    }

    fn with<R>(&self, method: Method, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state.calls.entry(method).or_default() += 1;
        f(&mut state)
    }

    fn inspect<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn now_secs(&self) -> i64 {
        self.env.unix_millis() / 1000
    }

    /// Snapshot of a room by id or name.
    pub fn room(&self, key: &str) -> Option<Room> {
        self.inspect(|state| state.record(key).ok().map(|record| record.room.clone()))
    }

    /// Votes recorded in the current round, in first-cast order.
    pub fn votes(&self, key: &str) -> Vec<Vote> {
        self.inspect(|state| state.record(key).map(|record| record.votes.clone()).unwrap_or_default())
    }

    /// Number of calls received for `method`, rejected ones included.
    pub fn calls(&self, method: Method) -> usize {
        self.inspect(|state| state.calls.get(&method).copied().unwrap_or(0))
    }

    /// Live watchers of a room's event stream.
    pub fn room_watchers(&self, key: &str) -> usize {
        self.inspect(|state| {
            state.record(key).map_or(0, |record| {
                record.room_sinks.retain(|sink| !sink.is_closed());
                record.room_sinks.len()
            })
        })
    }

    /// Live watchers of a room's vote stream.
    pub fn vote_watchers(&self, key: &str) -> usize {
        self.inspect(|state| {
            state.record(key).map_or(0, |record| {
                record.vote_sinks.retain(|sink| !sink.is_closed());
                record.vote_sinks.len()
            })
        })
    }

    /// Fail every live stream with a transport error.
    pub fn sever_streams(&self) {
        self.inspect(|state| {
            for record in state.rooms.values_mut() {
                record.sever();
            }
        });
    }

    /// Fail the next `count` stream opens with a transport error.
    pub fn fail_next_opens(&self, count: u32) {
        self.inspect(|state| state.failing_opens = count);
    }

    /// Close a room, notifying watchers. Returns whether it existed.
    pub fn close_room(&self, key: &str, reason: &str) -> bool {
        self.inspect(|state| state.close(key, reason))
    }
}

fn stream_of<T: Send + 'static>(
    mut events: mpsc::UnboundedReceiver<Result<T, ServiceError>>,
) -> EventStream<T> {
    futures::stream::poll_fn(move |cx| events.poll_recv(cx)).boxed()
}

/// Average, mode and consensus over the round's votes.
///
/// Values that parse as numbers contribute to the average. Consensus needs a
/// single vote, or at least two numeric votes that all agree.
pub fn summarize(votes: &[Vote]) -> VoteSummary {
    let numeric: Vec<(&str, f64)> = votes
        .iter()
        .filter_map(|v| v.value.parse::<f64>().ok().map(|n| (v.value.as_str(), n)))
        .collect();
    let numeric_average = (!numeric.is_empty())
        .then(|| numeric.iter().map(|(_, n)| n).sum::<f64>() / numeric.len() as f64);

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for vote in votes {
        match counts.iter_mut().find(|(value, _)| *value == vote.value) {
            Some((_, count)) => *count += 1,
            None => counts.push((vote.value.as_str(), 1)),
        }
    }
    let mode = counts
        .iter()
        .fold(None::<(&str, usize)>, |best, &(value, count)| match best {
            Some((_, top)) if top >= count => best,
            _ => Some((value, count)),
        })
        .map(|(value, _)| value.to_owned())
        .unwrap_or_default();

    let has_consensus = match votes.len() {
        0 => false,
        1 => true,
        _ => numeric.len() >= 2 && numeric.iter().all(|(value, _)| *value == numeric[0].0),
    };

    VoteSummary {
        votes: votes.to_vec(),
        average: numeric_average.map(|avg| format!("{avg:.1}")).unwrap_or_default(),
        mode,
        has_consensus,
        numeric_average,
    }
}

#[async_trait]
impl RoomService for MemoryAuthority {
    async fn create_room(&self, request: CreateRoomRequest) -> Result<SeatResponse, ServiceError> {
        let now = self.now_secs();
        let slug = generate_name(self.env.as_ref()).to_lowercase().replace(' ', "-");
        self.with(Method::CreateRoom, |state| {
            let room_id = state.next_id("room");
            let participant_id = state.next_id("p");
            let name = format!("{slug}-{}", state.next_id);

            let host = Participant {
                id: participant_id.clone(),
                name: request.host_name,
                is_host: true,
                is_spectator: false,
                is_connected: true,
                joined_at: now,
            };
            let room = Room {
                id: room_id.clone(),
                name: name.clone(),
                participants: vec![host],
                state: RoomState::Waiting,
                current_topic: String::new(),
                created_at: now,
                card_config: Some(request.card_config.unwrap_or_else(cards::default_config)),
            };
            let record = Record {
                room: room.clone(),
                tokens: HashMap::from([(participant_id.clone(), request.session_token)]),
                votes: Vec::new(),
                room_sinks: Vec::new(),
                vote_sinks: Vec::new(),
            };
            debug!(room = %name, "room created");
            state.names.insert(name, room_id.clone());
            state.rooms.insert(room_id, record);
            Ok(SeatResponse { room: Some(room), participant_id })
        })
    }

    async fn join_room(&self, request: JoinRoomRequest) -> Result<SeatResponse, ServiceError> {
        let now = self.now_secs();
        self.with(Method::JoinRoom, |state| {
            let fresh_id = state.next_id("p");
            let record = state.record(&request.room_id)?;

            let participant = match record.seat_holder(&request.session_token) {
                Some(id) => {
                    let existing = record.participant_mut(&id).ok_or_else(no_participant)?;
                    existing.is_connected = true;
                    if !request.participant_name.is_empty() {
                        existing.name = request.participant_name;
                    }
                    existing.clone()
                },
                None => {
                    let participant = Participant {
                        id: fresh_id,
                        name: request.participant_name,
                        is_host: false,
                        is_spectator: request.is_spectator,
                        is_connected: true,
                        joined_at: now,
                    };
                    record.tokens.insert(participant.id.clone(), request.session_token);
                    record.room.participants.push(participant.clone());
                    participant
                },
            };

            let participant_id = participant.id.clone();
            record.broadcast_room(&RoomEvent::ParticipantJoined { participant: Some(participant) });
            Ok(SeatResponse { room: Some(record.room.clone()), participant_id })
        })
    }

    async fn leave_room(&self, request: ParticipantRequest) -> Result<(), ServiceError> {
        self.with(Method::LeaveRoom, |state| {
            let record = state.record(&request.room_id)?;
            record.authorize(&request)?;

            let leaver = record.participant_mut(&request.participant_id).ok_or_else(no_participant)?;
            leaver.is_connected = false;
            let was_host = std::mem::take(&mut leaver.is_host);

            if !record.room.participants.iter().any(|p| p.is_connected) {
                state.close(&request.room_id, "all participants left");
                return Ok(());
            }

            let new_host = if was_host { record.promote_host() } else { None };
            record.broadcast_room(&RoomEvent::ParticipantLeft {
                participant_id: request.participant_id.clone(),
            });
            if let Some(new_host_id) = new_host {
                record.broadcast_room(&RoomEvent::HostChanged { new_host_id });
            }
            Ok(())
        })
    }

    async fn get_room(&self, request: GetRoomRequest) -> Result<GetRoomResponse, ServiceError> {
        self.with(Method::GetRoom, |state| {
            let record = state.record(&request.room_id)?;
            Ok(GetRoomResponse { room: Some(record.room.clone()) })
        })
    }

    async fn kick_participant(&self, request: KickParticipantRequest) -> Result<(), ServiceError> {
        self.with(Method::KickParticipant, |state| {
            let record = state.record(&request.actor.room_id)?;
            record.authorize_host(&request.actor)?;
            let target = request.target_participant_id;
            if target == request.actor.participant_id {
                return Err(ServiceError::rpc("invalid_argument", "cannot kick yourself"));
            }
            if record.room.participant(&target).is_none() {
                return Err(no_participant());
            }

            record.room.participants.retain(|p| p.id != target);
            record.tokens.remove(&target);
            record.votes.retain(|v| v.participant_id != target);

            if record.room.participants.is_empty() {
                state.close(&request.actor.room_id, "all participants left");
                return Ok(());
            }
            record.broadcast_room(&RoomEvent::ParticipantLeft { participant_id: target });
            Ok(())
        })
    }

    async fn transfer_ownership(&self, request: TransferOwnershipRequest) -> Result<(), ServiceError> {
        self.with(Method::TransferOwnership, |state| {
            let record = state.record(&request.actor.room_id)?;
            record.authorize_host(&request.actor)?;
            match record.room.participant(&request.new_host_id) {
                None => return Err(no_participant()),
                Some(p) if p.is_spectator => {
                    return Err(ServiceError::rpc(
                        "failed_precondition",
                        "cannot transfer ownership to a spectator",
                    ));
                },
                Some(_) => {},
            }

            for participant in &mut record.room.participants {
                participant.is_host = participant.id == request.new_host_id;
            }
            record.broadcast_room(&RoomEvent::HostChanged { new_host_id: request.new_host_id });
            Ok(())
        })
    }

    async fn watch_room(&self, request: WatchRequest) -> Result<EventStream<RoomEvent>, ServiceError> {
        self.with(Method::WatchRoom, |state| {
            if state.take_failing_open() {
                return Err(ServiceError::Transport("connection refused".to_owned()));
            }
            let record = state.record(&request.room_id)?;
            let (sink, events) = mpsc::unbounded_channel();
            record.room_sinks.push(sink);
            Ok(stream_of(events))
        })
    }
}

#[async_trait]
impl EstimationService for MemoryAuthority {
    async fn start_round(&self, request: ParticipantRequest) -> Result<(), ServiceError> {
        self.with(Method::StartRound, |state| {
            let record = state.record(&request.room_id)?;
            record.authorize_host(&request)?;
            record.room.state = RoomState::Voting;
            record.broadcast_room(&RoomEvent::StateChanged { new_state: RoomState::Voting });
            Ok(())
        })
    }

    async fn cast_vote(&self, request: CastVoteRequest) -> Result<(), ServiceError> {
        self.with(Method::CastVote, |state| {
            let record = state.record(&request.actor.room_id)?;
            record.authorize(&request.actor)?;
            if record.room.state != RoomState::Voting {
                return Err(invalid_state());
            }
            let voter = record.room.participant(&request.actor.participant_id).ok_or_else(no_participant)?;
            if voter.is_spectator {
                return Err(ServiceError::rpc("permission_denied", "spectators cannot vote"));
            }
            let participant_name = voter.name.clone();
            let participant_id = request.actor.participant_id;

            match record.votes.iter_mut().find(|v| v.participant_id == participant_id) {
                Some(vote) => vote.value = request.value,
                None => record.votes.push(Vote {
                    participant_id: participant_id.clone(),
                    participant_name: participant_name.clone(),
                    value: request.value,
                }),
            }
            record.broadcast_votes(&VoteEvent::VoteCast { participant_id, participant_name });
            Ok(())
        })
    }

    async fn reveal_votes(&self, request: ParticipantRequest) -> Result<RevealVotesResponse, ServiceError> {
        self.with(Method::RevealVotes, |state| {
            let record = state.record(&request.room_id)?;
            record.authorize_host(&request)?;
            if record.room.state != RoomState::Voting {
                return Err(invalid_state());
            }

            record.room.state = RoomState::Revealed;
            let summary = record.summary();
            record.broadcast_votes(&VoteEvent::VotesRevealed { summary: Some(summary.clone()) });
            record.broadcast_room(&RoomEvent::StateChanged { new_state: RoomState::Revealed });
            Ok(RevealVotesResponse { summary: Some(summary) })
        })
    }

    async fn reset_round(&self, request: ParticipantRequest) -> Result<(), ServiceError> {
        self.with(Method::ResetRound, |state| {
            let record = state.record(&request.room_id)?;
            record.authorize_host(&request)?;

            record.votes.clear();
            record.room.state = RoomState::Voting;
            record.broadcast_votes(&VoteEvent::RoundReset {});
            record.broadcast_room(&RoomEvent::StateChanged { new_state: RoomState::Voting });
            Ok(())
        })
    }

    async fn set_topic(&self, request: SetTopicRequest) -> Result<(), ServiceError> {
        self.with(Method::SetTopic, |state| {
            let record = state.record(&request.actor.room_id)?;
            record.authorize_host(&request.actor)?;

            record.room.current_topic.clone_from(&request.topic);
            record.broadcast_room(&RoomEvent::TopicChanged { topic: request.topic });
            if record.room.state == RoomState::Waiting {
                record.room.state = RoomState::Voting;
                record.broadcast_room(&RoomEvent::StateChanged { new_state: RoomState::Voting });
            }
            Ok(())
        })
    }

    async fn watch_votes(&self, request: WatchRequest) -> Result<EventStream<VoteEvent>, ServiceError> {
        self.with(Method::WatchVotes, |state| {
            if state.take_failing_open() {
                return Err(ServiceError::Transport("connection refused".to_owned()));
            }
            let record = state.record(&request.room_id)?;
            let (sink, events) = mpsc::unbounded_channel();
            record.vote_sinks.push(sink);
            Ok(stream_of(events))
        })
    }
}

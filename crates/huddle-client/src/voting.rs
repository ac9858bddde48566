//! Voting synchronization engine.
//!
//! Tracks one room's rounds for a participant that is already seated. Vote
//! values stay secret until reveal: `voteCast` events only flip a participant's
//! `has_voted` flag. The local vote is kept in `current_vote` once the
//! authority accepts it.

use huddle_proto::{
    VoteEvent, VoteSummary,
    rpc::{CastVoteRequest, ParticipantRequest},
};
use tracing::debug;

use crate::room::Seat;

/// Whether a participant has voted this round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteStatus {
    /// Voter.
    pub participant_id: String,
    /// Voter display name.
    pub participant_name: String,
    /// Voted since the last reset.
    pub has_voted: bool,
}

/// Read-only voting state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VotingView {
    /// One entry per participant seen voting, in first-vote order.
    pub vote_statuses: Vec<VoteStatus>,
    /// Revealed result.
    pub summary: Option<VoteSummary>,
    /// The local participant's accepted vote.
    pub current_vote: Option<String>,
    /// Whether the round is revealed.
    pub is_revealed: bool,
    /// Host gating for reveal and reset.
    pub is_host: bool,
    /// Spectators never vote.
    pub is_spectator: bool,
    /// Whether the vote event stream is up.
    pub is_connected: bool,
    /// A call is in flight.
    pub is_loading: bool,
    /// Last error.
    pub error: Option<String>,
}

impl VotingView {
    /// Participants who voted this round.
    pub fn voted_count(&self) -> usize {
        self.vote_statuses.iter().filter(|s| s.has_voted).count()
    }

    /// Whether `participant_id` voted this round.
    pub fn has_voted(&self, participant_id: &str) -> bool {
        self.vote_statuses.iter().any(|s| s.participant_id == participant_id && s.has_voted)
    }
}

/// Round state machine.
#[derive(Debug, Clone)]
pub struct VotingEngine {
    seat: Seat,
    view: VotingView,
    stream_error: bool,
}

impl VotingEngine {
    /// Engine for `seat`.
    pub fn new(seat: Seat, is_host: bool) -> Self {
        Self { seat, view: VotingView { is_host, ..VotingView::default() }, stream_error: false }
    }

    /// Identifiers used for every call.
    pub fn seat(&self) -> &Seat {
        &self.seat
    }

    /// Current view.
    pub fn view(&self) -> &VotingView {
        &self.view
    }

    /// Mark the seat as a spectator, which cannot vote.
    #[must_use]
    pub fn spectating(mut self, is_spectator: bool) -> Self {
        self.view.is_spectator = is_spectator;
        self
    }

    /// Follow a host change reported by the room engine.
    pub fn set_host(&mut self, is_host: bool) {
        self.view.is_host = is_host;
    }

    /// Body for `CastVote`. Not for spectators.
    pub fn vote_request(&mut self, value: &str) -> Option<CastVoteRequest> {
        if !self.seat.is_complete() || self.view.is_spectator {
            return None;
        }
        self.started();
        Some(CastVoteRequest { actor: self.seat.request(), value: value.to_owned() })
    }

    /// The vote was accepted. Replaces any earlier vote.
    pub fn vote_cast(&mut self, value: String) {
        self.view.current_vote = Some(value);
        self.view.is_loading = false;
    }

    /// Body for `RevealVotes`. Host only.
    pub fn reveal_request(&mut self) -> Option<ParticipantRequest> {
        let request = self.host_request()?;
        self.started();
        Some(request)
    }

    /// Reveal answered with the authority's summary.
    pub fn revealed(&mut self, summary: Option<VoteSummary>) {
        self.view.summary = summary;
        self.view.is_revealed = true;
        self.view.is_loading = false;
    }

    /// Body for `ResetRound`. Host only.
    pub fn reset_request(&mut self) -> Option<ParticipantRequest> {
        let request = self.host_request()?;
        self.started();
        Some(request)
    }

    /// The round was reset, by our call or by an event.
    pub fn round_reset(&mut self) {
        for status in &mut self.view.vote_statuses {
            status.has_voted = false;
        }
        self.view.summary = None;
        self.view.current_vote = None;
        self.view.is_revealed = false;
        self.view.is_loading = false;
    }

    /// A call failed.
    pub fn request_failed(&mut self, message: String) {
        self.view.is_loading = false;
        self.view.error = Some(message);
        self.stream_error = false;
    }

    /// The vote event stream (re)opened.
    pub fn connected(&mut self) {
        self.view.is_connected = true;
        if self.stream_error {
            self.view.error = None;
            self.stream_error = false;
        }
    }

    /// The vote event stream dropped and will be retried.
    pub fn disconnected(&mut self, error: String) {
        self.view.is_connected = false;
        self.view.error = Some(error);
        self.stream_error = true;
    }

    /// Apply one server event.
    pub fn apply_event(&mut self, event: VoteEvent) {
        match event {
            VoteEvent::VoteCast { participant_id, participant_name } => {
                debug!(participant = %participant_id, "vote cast");
                match self.view.vote_statuses.iter_mut().find(|s| s.participant_id == participant_id) {
                    Some(status) => status.has_voted = true,
                    None => self.view.vote_statuses.push(VoteStatus {
                        participant_id,
                        participant_name,
                        has_voted: true,
                    }),
                }
            },
            VoteEvent::VotesRevealed { summary } => {
                debug!(votes = summary.as_ref().map_or(0, |s| s.votes.len()), "votes revealed");
                self.view.summary = summary;
                self.view.is_revealed = true;
            },
            VoteEvent::RoundReset {} => {
                debug!("round reset");
                self.round_reset();
            },
        }
    }

    fn host_request(&self) -> Option<ParticipantRequest> {
        (self.view.is_host && self.seat.is_complete()).then(|| self.seat.request())
    }

    fn started(&mut self) {
        self.view.is_loading = true;
        self.view.error = None;
        self.stream_error = false;
    }
}

//! Interactive room session.
//!
//! Reads commands line by line and reports room and round changes as they
//! arrive. A [`VotingClient`] follows the room client's seat: it is started
//! once seated, restarted when the seat changes and dropped when the room is
//! lost. Host changes reach it through [`VotingClient::set_host`].

use std::sync::Arc;

use huddle_client::{ClientConfig, ClientError, RoomClient, RoomView, Seat, VotingClient, VotingView};
use huddle_core::{Environment, EstimationService, IdentityStore, RoomService};
use huddle_proto::{CardConfig, VoteSummary};
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::watch,
};
use tracing::{info, warn};

use crate::commands::{self, Command};

/// Session failures.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Creating or joining the room failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A remembered seat could not be reclaimed.
    #[error("could not rejoin: {0}")]
    Rejoin(String),

    /// Reading input failed.
    #[error("failed to read input: {0}")]
    Input(#[from] std::io::Error),
}

/// Whether the session keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Read the next command.
    Continue,
    /// Stop the session.
    Exit,
}

struct Votes {
    seat: Seat,
    is_host: bool,
    client: VotingClient,
    state: watch::Receiver<VotingView>,
}

/// A seated room client plus the voting client that follows it.
pub struct Session<S> {
    service: Arc<S>,
    env: Arc<dyn Environment>,
    config: ClientConfig,
    room: RoomClient,
    votes: Option<Votes>,
    seated: bool,
}

impl<S: RoomService + EstimationService> Session<S> {
    /// Wrap a room client. Call [`Session::sync`] once it is seated.
    pub fn new(service: Arc<S>, room: RoomClient, env: Arc<dyn Environment>, config: ClientConfig) -> Self {
        Self { service, env, config, room, votes: None, seated: false }
    }

    /// Create a room hosted by `identity` and take its seat.
    pub async fn create(
        service: Arc<S>,
        identity: Arc<IdentityStore>,
        env: Arc<dyn Environment>,
        config: ClientConfig,
        name: Option<&str>,
        deck: CardConfig,
    ) -> Result<Self, SessionError> {
        let name = name.map_or_else(|| identity.display_name(), str::to_owned);
        let room = RoomClient::spawn(Arc::clone(&service), identity, Arc::clone(&env), config, None);
        let room_name = room.create_room(&name, Some(deck)).await?;
        info!(room = %room_name, %name, "room created");
        Ok(Self::new(service, room, env, config))
    }

    /// Enter `room_name`.
    ///
    /// Without an explicit name, a seat remembered for the room is reclaimed
    /// silently. Otherwise the room is joined under `name`, or the identity's
    /// display name.
    pub async fn join(
        service: Arc<S>,
        identity: Arc<IdentityStore>,
        env: Arc<dyn Environment>,
        config: ClientConfig,
        room_name: &str,
        name: Option<&str>,
        is_spectator: bool,
    ) -> Result<Self, SessionError> {
        let resume = name.is_none() && identity.room_participant_id(room_name).is_some();
        if resume {
            let room =
                RoomClient::spawn(Arc::clone(&service), identity, Arc::clone(&env), config, Some(room_name));
            let view = room
                .wait_for(|view| view.room.is_some() || view.error.is_some())
                .await
                .ok_or(ClientError::Stopped)?;
            if view.room.is_none() {
                let reason = view.error.unwrap_or_default();
                room.shutdown().await;
                return Err(SessionError::Rejoin(reason));
            }
            info!(room = %room_name, "seat reclaimed");
            return Ok(Self::new(service, room, env, config));
        }

        let name = name.map_or_else(|| identity.display_name(), str::to_owned);
        let room = RoomClient::spawn(Arc::clone(&service), identity, Arc::clone(&env), config, None);
        room.join_room(room_name, &name, is_spectator).await?;
        info!(room = %room_name, %name, spectator = is_spectator, "joined");
        Ok(Self::new(service, room, env, config))
    }

    /// The room client.
    pub fn room(&self) -> &RoomClient {
        &self.room
    }

    /// The voting client, while seated.
    pub fn votes(&self) -> Option<&VotingClient> {
        self.votes.as_ref().map(|votes| &votes.client)
    }

    /// Align the voting client with the room client's seat and host flag.
    pub async fn sync(&mut self) -> Step {
        let view = self.room.view();
        let Some(seat) = view.seat() else {
            self.votes = None;
            if self.seated {
                warn!(reason = view.error.as_deref().unwrap_or("left"), "no longer in the room");
                return Step::Exit;
            }
            return Step::Continue;
        };
        self.seated = true;

        match &mut self.votes {
            Some(votes) if votes.seat == seat => {
                if votes.is_host != view.is_host {
                    votes.is_host = view.is_host;
                    votes.client.set_host(view.is_host).await;
                }
            },
            _ => {
                let client = VotingClient::spawn(
                    Arc::clone(&self.service),
                    seat.clone(),
                    view.is_host,
                    view.is_spectator,
                    Arc::clone(&self.env),
                    self.config,
                );
                let state = client.subscribe();
                self.votes = Some(Votes { seat, is_host: view.is_host, client, state });
            },
        }
        Step::Continue
    }

    /// Run one command.
    pub async fn execute(&mut self, command: Command) -> Step {
        let view = self.room.view();
        match command {
            Command::StartRound => self.room.start_round().await,
            Command::Vote { value } => match self.votes() {
                Some(votes) => votes.cast_vote(&value).await,
                None => warn!("not seated in a room"),
            },
            Command::Reveal => {
                if self.require_host(&view, "reveal") {
                    if let Some(votes) = self.votes() {
                        votes.reveal_votes().await;
                    }
                }
            },
            Command::Reset => {
                if self.require_host(&view, "reset") {
                    if let Some(votes) = self.votes() {
                        votes.reset_round().await;
                    }
                }
            },
            Command::Kick { participant_id } => {
                if self.require_host(&view, "kick") {
                    self.room.kick_participant(&participant_id).await;
                }
            },
            Command::Transfer { participant_id } => {
                if self.require_host(&view, "host") {
                    self.room.transfer_ownership(&participant_id).await;
                }
            },
            Command::Topic { topic } => {
                if self.require_host(&view, "topic") {
                    self.room.set_topic(&topic).await;
                }
            },
            Command::Refresh => self.room.refresh().await,
            Command::Show => {
                report_room(&view);
                if let Some(votes) = self.votes() {
                    report_votes(&votes.view());
                }
            },
            Command::Leave => {
                self.votes = None;
                self.seated = false;
                self.room.leave_room().await;
                info!("left the room");
                return Step::Exit;
            },
            Command::Quit => return Step::Exit,
            Command::Empty => {},
            Command::Unknown { input } => warn!(%input, "unknown command"),
            Command::InvalidArgs { command, error } => warn!(%command, %error, "invalid arguments"),
        }
        self.sync().await
    }

    /// Drive the session from `input` until it ends or the room is lost.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) -> Result<(), SessionError> {
        let mut lines = input.lines();
        let mut room_state = self.room.subscribe();
        let mut last_room = room_state.borrow_and_update().clone();
        let mut last_votes = VotingView::default();
        report_room(&last_room);

        if self.sync().await == Step::Exit {
            return Ok(());
        }

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if self.execute(commands::parse(&line)).await == Step::Exit {
                            break;
                        }
                    },
                    None => break,
                },
                changed = room_state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = room_state.borrow_and_update().clone();
                    room_changes(&last_room, &view);
                    last_room = view;
                    if self.sync().await == Step::Exit {
                        break;
                    }
                },
                Some(view) = vote_change(&mut self.votes) => {
                    vote_changes(&last_votes, &view);
                    last_votes = view;
                },
            }
        }
        Ok(())
    }

    /// Stop both clients.
    pub async fn shutdown(mut self) {
        if let Some(votes) = self.votes.take() {
            votes.client.shutdown().await;
        }
        self.room.shutdown().await;
    }

    fn require_host(&self, view: &RoomView, command: &str) -> bool {
        if !view.is_host {
            warn!(%command, "only the host can do that");
        }
        view.is_host
    }
}

/// Next voting view, pending forever while not seated.
async fn vote_change(votes: &mut Option<Votes>) -> Option<VotingView> {
    match votes {
        Some(votes) => match votes.state.changed().await {
            Ok(()) => Some(votes.state.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

fn report_room(view: &RoomView) {
    let Some(room) = &view.room else {
        info!("not in a room");
        return;
    };
    info!(
        room = %room.name,
        state = room.state.as_str(),
        topic = %room.current_topic,
        host = view.is_host,
        connected = view.is_connected,
        "room"
    );
    for participant in &room.participants {
        info!(
            id = %participant.id,
            name = %participant.name,
            host = participant.is_host,
            spectator = participant.is_spectator,
            online = participant.is_connected,
            "participant"
        );
    }
}

fn report_votes(view: &VotingView) {
    info!(voted = view.voted_count(), mine = view.current_vote.as_deref().unwrap_or("-"), "round");
    if let Some(summary) = &view.summary {
        report_summary(summary);
    }
}

fn report_summary(summary: &VoteSummary) {
    for vote in &summary.votes {
        info!(name = %vote.participant_name, value = %vote.value, "vote");
    }
    info!(average = %summary.average, mode = %summary.mode, consensus = summary.has_consensus, "revealed");
}

fn room_changes(before: &RoomView, after: &RoomView) {
    if before.room_name() != after.room_name() {
        report_room(after);
        return;
    }
    if before.state() != after.state() {
        info!(state = after.state().as_str(), "round state changed");
    }
    if before.topic() != after.topic() {
        info!(topic = %after.topic(), "topic changed");
    }
    if before.is_host != after.is_host {
        info!(host = after.is_host, "host role changed");
    }
    if before.participants() != after.participants() {
        let names: Vec<&str> = after.participants().iter().map(|p| p.name.as_str()).collect();
        info!(participants = ?names, "participants changed");
    }
    if before.is_connected != after.is_connected {
        if after.is_connected {
            info!("room stream connected");
        } else {
            warn!("room stream disconnected");
        }
    }
    if before.error != after.error {
        if let Some(error) = &after.error {
            warn!(%error, "room error");
        }
    }
}

fn vote_changes(before: &VotingView, after: &VotingView) {
    if before.voted_count() != after.voted_count() {
        info!(voted = after.voted_count(), "votes in");
    }
    if before.current_vote != after.current_vote {
        if let Some(vote) = &after.current_vote {
            info!(%vote, "vote accepted");
        }
    }
    if before.summary != after.summary {
        if let Some(summary) = &after.summary {
            report_summary(summary);
        }
    }
    if before.is_revealed && !after.is_revealed {
        info!("new round");
    }
    if before.error != after.error {
        if let Some(error) = &after.error {
            warn!(%error, "voting error");
        }
    }
}

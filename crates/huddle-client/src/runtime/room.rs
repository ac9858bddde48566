//! Room client: handle and background loop for [`RoomEngine`].

use std::{future::Future, sync::Arc};

use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use huddle_core::{
    Environment, EstimationService, IdentityStore, RoomService, ServiceError, Watch, WatchEvent,
};
use huddle_proto::{
    CardConfig, RoomEvent,
    rpc::{CreateRoomRequest, GetRoomResponse, JoinRoomRequest, SeatResponse, WatchRequest},
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::next_event;
use crate::{
    ClientConfig, ClientError,
    room::{RoomAction, RoomEngine, RoomView, Seat},
};

type Done = oneshot::Sender<()>;

enum Command {
    Create {
        host_name: String,
        card_config: Option<CardConfig>,
        reply: oneshot::Sender<Result<String, ClientError>>,
    },
    Join {
        room: String,
        name: String,
        is_spectator: bool,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Leave(Done),
    StartRound(Done),
    Kick { target: String, reply: Done },
    Transfer { new_host: String, reply: Done },
    SetTopic { topic: String, reply: Done },
    Refresh(Done),
}

enum Completion {
    Created {
        token: String,
        result: Result<SeatResponse, ServiceError>,
        reply: oneshot::Sender<Result<String, ClientError>>,
    },
    Joined {
        token: String,
        result: Result<SeatResponse, ServiceError>,
        reply: Option<oneshot::Sender<Result<(), ClientError>>>,
    },
    Left { result: Result<(), ServiceError>, reply: Done },
    RoundStarted { room_id: String, result: Result<(), ServiceError>, reply: Done },
    Acted { result: Result<(), ServiceError>, reply: Done },
    Refreshed { result: Result<GetRoomResponse, ServiceError>, reply: Done },
}

/// Answer to a caller, sent once the resulting view is published.
enum Reply {
    Created(oneshot::Sender<Result<String, ClientError>>, Result<String, ClientError>),
    Joined(Option<oneshot::Sender<Result<(), ClientError>>>, Result<(), ClientError>),
    Done(Done),
}

impl Reply {
    fn send(self) {
        match self {
            Self::Created(reply, outcome) => {
                let _ = reply.send(outcome);
            },
            Self::Joined(reply, outcome) => {
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            },
            Self::Done(reply) => {
                let _ = reply.send(());
            },
        }
    }
}

/// Handle to a running room engine.
///
/// Dropping the handle tears the engine down: the event stream is cancelled
/// and in-flight calls are abandoned.
#[derive(Debug)]
pub struct RoomClient {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<RoomView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Create { .. } => "Create",
            Self::Join { .. } => "Join",
            Self::Leave(_) => "Leave",
            Self::StartRound(_) => "StartRound",
            Self::Kick { .. } => "Kick",
            Self::Transfer { .. } => "Transfer",
            Self::SetTopic { .. } => "SetTopic",
            Self::Refresh(_) => "Refresh",
        };
        f.write_str(name)
    }
}

impl RoomClient {
    /// Start the engine on the current tokio runtime.
    ///
    /// With `room` set and a seat remembered for it, the seat is reclaimed
    /// immediately with an empty name, so a reload resumes the session
    /// without prompting.
    pub fn spawn<S>(
        service: Arc<S>,
        identity: Arc<IdentityStore>,
        env: Arc<dyn Environment>,
        config: ClientConfig,
        room: Option<&str>,
    ) -> Self
    where
        S: RoomService + EstimationService,
    {
        let (commands, receiver) = mpsc::channel(config.command_capacity.max(1));
        let (publisher, state) = watch::channel(RoomView::default());
        let cancel = CancellationToken::new();

        let mut worker = Worker {
            service,
            identity,
            env,
            config,
            engine: RoomEngine::new(),
            state: publisher,
            cancel: cancel.clone(),
            commands: receiver,
            inflight: FuturesUnordered::new(),
            stream: None,
            stream_cancel: None,
        };
        if let Some(room) = room {
            worker.resume(room);
        }

        let task = tokio::spawn(worker.run());
        Self { commands, state, cancel, task: Some(task) }
    }

    /// Create a room hosted by the local identity. Returns its durable name.
    pub async fn create_room(
        &self,
        host_name: &str,
        card_config: Option<CardConfig>,
    ) -> Result<String, ClientError> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::Create { host_name: host_name.to_owned(), card_config, reply }).await?;
        answer.await.map_err(|_| ClientError::Stopped)?
    }

    /// Join a room by id or durable name.
    pub async fn join_room(&self, room: &str, name: &str, is_spectator: bool) -> Result<(), ClientError> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::Join { room: room.to_owned(), name: name.to_owned(), is_spectator, reply })
            .await?;
        answer.await.map_err(|_| ClientError::Stopped)?
    }

    /// Leave the room. The seat stays remembered for a later rejoin.
    pub async fn leave_room(&self) {
        self.call(Command::Leave).await;
    }

    /// Start a voting round.
    pub async fn start_round(&self) {
        self.call(Command::StartRound).await;
    }

    /// Remove a participant. Host only.
    pub async fn kick_participant(&self, target: &str) {
        let target = target.to_owned();
        self.call(|reply| Command::Kick { target, reply }).await;
    }

    /// Hand host privileges to another participant. Host only.
    pub async fn transfer_ownership(&self, new_host_id: &str) {
        let new_host = new_host_id.to_owned();
        self.call(|reply| Command::Transfer { new_host, reply }).await;
    }

    /// Change the topic under estimation. Host only.
    pub async fn set_topic(&self, topic: &str) {
        let topic = topic.to_owned();
        self.call(|reply| Command::SetTopic { topic, reply }).await;
    }

    /// Reload the room snapshot from the authority.
    pub async fn refresh(&self) {
        self.call(Command::Refresh).await;
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> RoomView {
        self.state.borrow().clone()
    }

    /// Identifiers for a [`crate::VotingClient`], when seated.
    pub fn seat(&self) -> Option<Seat> {
        self.state.borrow().seat()
    }

    /// Receiver notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<RoomView> {
        self.state.clone()
    }

    /// Wait until the view satisfies `predicate`. `None` once stopped.
    pub async fn wait_for(&self, predicate: impl FnMut(&RoomView) -> bool) -> Option<RoomView> {
        let mut state = self.state.clone();
        state.wait_for(predicate).await.ok().map(|view| view.clone())
    }

    /// Tear down and wait for the background task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(%err, "room client task failed");
            }
        }
    }

    async fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).await.map_err(|_| ClientError::Stopped)
    }

    async fn call(&self, command: impl FnOnce(Done) -> Command) {
        let (reply, done) = oneshot::channel();
        if self.send(command(reply)).await.is_ok() {
            let _ = done.await;
        }
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker<S> {
    service: Arc<S>,
    identity: Arc<IdentityStore>,
    env: Arc<dyn Environment>,
    config: ClientConfig,
    engine: RoomEngine,
    state: watch::Sender<RoomView>,
    cancel: CancellationToken,
    commands: mpsc::Receiver<Command>,
    inflight: FuturesUnordered<BoxFuture<'static, Completion>>,
    stream: Option<Watch<RoomEvent>>,
    stream_cancel: Option<CancellationToken>,
}

impl<S> Worker<S>
where
    S: RoomService + EstimationService,
{
    async fn run(mut self) {
        self.publish();
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(completion) = self.inflight.next(), if !self.inflight.is_empty() => {
                    let reply = self.complete(completion);
                    self.publish();
                    reply.send();
                },
                event = next_event(&mut self.stream) => self.observe(event),
            }
            self.publish();
        }
        self.stop_watching();
        debug!("room client stopped");
    }

    fn publish(&self) {
        self.state.send_if_modified(|view| {
            if view == self.engine.view() {
                return false;
            }
            view.clone_from(self.engine.view());
            true
        });
    }

    fn resume(&mut self, room: &str) {
        if self.identity.room_participant_id(room).is_none() {
            return;
        }
        info!(room, "reclaiming remembered seat");
        self.join(room.to_owned(), String::new(), false, None);
    }

    fn handle(&mut self, command: Command) {
        debug!(?command, "command");
        match command {
            Command::Create { host_name, card_config, reply } => {
                self.engine.request_started();
                let token = self.identity.token();
                let request =
                    CreateRoomRequest { host_name, session_token: token.clone(), card_config };
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let result = service.create_room(request).await;
                    Completion::Created { token, result, reply }
                });
            },
            Command::Join { room, name, is_spectator, reply } => {
                self.join(room, name, is_spectator, Some(reply));
            },
            Command::Leave(reply) => {
                let Some(request) = self.engine.leave_request() else {
                    let _ = reply.send(());
                    return;
                };
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let result = service.leave_room(request).await;
                    Completion::Left { result, reply }
                });
            },
            Command::StartRound(reply) => {
                let Some(request) = self.engine.start_round_request() else {
                    let _ = reply.send(());
                    return;
                };
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let room_id = request.room_id.clone();
                    let result = service.start_round(request).await;
                    Completion::RoundStarted { room_id, result, reply }
                });
            },
            Command::Kick { target, reply } => {
                let Some(request) = self.engine.kick_request(&target) else {
                    let _ = reply.send(());
                    return;
                };
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let result = service.kick_participant(request).await;
                    Completion::Acted { result, reply }
                });
            },
            Command::Transfer { new_host, reply } => {
                let Some(request) = self.engine.transfer_request(&new_host) else {
                    let _ = reply.send(());
                    return;
                };
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let result = service.transfer_ownership(request).await;
                    Completion::Acted { result, reply }
                });
            },
            Command::SetTopic { topic, reply } => {
                let Some(request) = self.engine.topic_request(&topic) else {
                    let _ = reply.send(());
                    return;
                };
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let result = service.set_topic(request).await;
                    Completion::Acted { result, reply }
                });
            },
            Command::Refresh(reply) => {
                let Some(request) = self.engine.refresh_request() else {
                    let _ = reply.send(());
                    return;
                };
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let result = service.get_room(request).await;
                    Completion::Refreshed { result, reply }
                });
            },
        }
    }

    fn join(
        &mut self,
        room: String,
        name: String,
        is_spectator: bool,
        reply: Option<oneshot::Sender<Result<(), ClientError>>>,
    ) {
        self.engine.request_started();
        let token = self.identity.token();
        let request = JoinRoomRequest {
            room_id: room,
            participant_name: name,
            session_token: token.clone(),
            is_spectator,
        };
        let service = Arc::clone(&self.service);
        self.spawn(async move {
            let result = service.join_room(request).await;
            Completion::Joined { token, result, reply }
        });
    }

    fn spawn(&mut self, call: impl Future<Output = Completion> + Send + 'static) {
        self.inflight.push(call.boxed());
    }

    fn complete(&mut self, completion: Completion) -> Reply {
        match completion {
            Completion::Created { token, result, reply } => {
                Reply::Created(reply, self.take_seat(token, result, true))
            },
            Completion::Joined { token, result, reply } => {
                Reply::Joined(reply, self.take_seat(token, result, false).map(drop))
            },
            Completion::Left { result, reply } => {
                match result {
                    Ok(()) => {
                        let actions = self.engine.left();
                        self.execute(actions);
                    },
                    Err(err) => {
                        warn!(%err, "leave failed");
                        self.engine.leave_failed(err.to_string());
                    },
                }
                Reply::Done(reply)
            },
            Completion::RoundStarted { room_id, result, reply } => {
                match result {
                    Ok(()) => self.engine.round_started(&room_id),
                    Err(err) if self.engine.is_in(&room_id) => self.fail(&err),
                    Err(err) => debug!(%err, room = %room_id, "round start failed in a room no longer entered"),
                }
                Reply::Done(reply)
            },
            Completion::Acted { result, reply } => {
                match result {
                    Ok(()) => self.engine.action_succeeded(),
                    Err(err) => self.fail(&err),
                }
                Reply::Done(reply)
            },
            Completion::Refreshed { result, reply } => {
                match result {
                    Ok(response) => self.engine.refreshed(response.room),
                    Err(err) => self.fail(&err),
                }
                Reply::Done(reply)
            },
        }
    }

    fn take_seat(
        &mut self,
        token: String,
        result: Result<SeatResponse, ServiceError>,
        created: bool,
    ) -> Result<String, ClientError> {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, created, "could not enter room");
                self.engine.request_failed(err.to_string());
                return Err(err.into());
            },
        };
        let Some(room) = response.room else {
            let message = if created { "Failed to create room" } else { "Failed to join room" };
            self.engine.request_failed(message.to_owned());
            return Err(ClientError::MissingRoom);
        };

        let name = room.name.clone();
        let actions = self.engine.seated(room, response.participant_id, token, created);
        self.execute(actions);
        Ok(name)
    }

    fn fail(&mut self, err: &ServiceError) {
        warn!(%err, "request failed");
        self.engine.action_failed(err.to_string());
    }

    fn observe(&mut self, event: WatchEvent<RoomEvent>) {
        match event {
            WatchEvent::Connected => self.engine.connected(),
            WatchEvent::Item(event) => {
                let actions = self.engine.apply_event(event);
                self.execute(actions);
            },
            WatchEvent::Disconnected { error, .. } => self.engine.disconnected(error),
            WatchEvent::Stopped => {
                self.stream = None;
                self.stream_cancel = None;
            },
        }
    }

    fn execute(&mut self, actions: Vec<RoomAction>) {
        for action in actions {
            match action {
                RoomAction::SaveParticipant { room, participant_id } => {
                    self.identity.save_room_participant_id(&room, &participant_id);
                },
                RoomAction::ClearParticipant { room } => self.identity.clear_room_participant_id(&room),
                RoomAction::RecordVisit { room } => self.identity.record_visit(&room),
                RoomAction::Watch { room_id, session_token } => self.watch(room_id, session_token),
                RoomAction::StopWatching => self.stop_watching(),
                RoomAction::Terminate => {
                    if let Some(stream) = self.stream.as_mut() {
                        stream.terminate();
                    }
                    self.stream = None;
                    self.stream_cancel = None;
                },
            }
        }
    }

    fn watch(&mut self, room_id: String, session_token: String) {
        self.stop_watching();

        let cancel = self.cancel.child_token();
        let service = Arc::clone(&self.service);
        let request = WatchRequest { room_id, session_token };
        let open = move || {
            let service = Arc::clone(&service);
            let request = request.clone();
            async move { service.watch_room(request).await }.boxed()
        };

        self.stream = Some(Watch::new(open, self.config.retry, Arc::clone(&self.env), cancel.clone()));
        self.stream_cancel = Some(cancel);
    }

    fn stop_watching(&mut self) {
        if let Some(cancel) = self.stream_cancel.take() {
            cancel.cancel();
        }
        self.stream = None;
    }
}

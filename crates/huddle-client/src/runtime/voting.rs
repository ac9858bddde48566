//! Voting client: handle and background loop for [`VotingEngine`].

use std::{future::Future, sync::Arc};

use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use huddle_core::{Environment, EstimationService, ServiceError, Watch, WatchEvent};
use huddle_proto::{VoteEvent, rpc::RevealVotesResponse};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::next_event;
use crate::{
    ClientConfig,
    room::Seat,
    voting::{VotingEngine, VotingView},
};

type Done = oneshot::Sender<()>;

#[derive(Debug)]
enum Command {
    Vote { value: String, reply: Done },
    Reveal(Done),
    Reset(Done),
    SetHost(bool),
}

enum Completion {
    Voted { value: String, result: Result<(), ServiceError>, reply: Done },
    Revealed { result: Result<RevealVotesResponse, ServiceError>, reply: Done },
    Reset { result: Result<(), ServiceError>, reply: Done },
}

/// Handle to a running voting engine for one seat.
#[derive(Debug)]
pub struct VotingClient {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<VotingView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl VotingClient {
    /// Start the engine and subscribe to vote events for `seat`.
    pub fn spawn<S: EstimationService>(
        service: Arc<S>,
        seat: Seat,
        is_host: bool,
        is_spectator: bool,
        env: Arc<dyn Environment>,
        config: ClientConfig,
    ) -> Self {
        let (commands, receiver) = mpsc::channel(config.command_capacity.max(1));
        let engine = VotingEngine::new(seat, is_host).spectating(is_spectator);
        let (publisher, state) = watch::channel(engine.view().clone());
        let cancel = CancellationToken::new();

        let stream = engine.seat().is_complete().then(|| {
            let request = engine.seat().watch_request();
            let service = Arc::clone(&service);
            let open = move || {
                let service = Arc::clone(&service);
                let request = request.clone();
                async move { service.watch_votes(request).await }.boxed()
            };
            Watch::new(open, config.retry, env, cancel.child_token())
        });

        let worker = Worker {
            service,
            engine,
            state: publisher,
            cancel: cancel.clone(),
            commands: receiver,
            inflight: FuturesUnordered::new(),
            stream,
        };
        let task = tokio::spawn(worker.run());
        Self { commands, state, cancel, task: Some(task) }
    }

    /// Cast or replace the local vote.
    pub async fn cast_vote(&self, value: &str) {
        let value = value.to_owned();
        self.call(|reply| Command::Vote { value, reply }).await;
    }

    /// Reveal the round. Host only.
    pub async fn reveal_votes(&self) {
        self.call(Command::Reveal).await;
    }

    /// Start a fresh round. Host only.
    pub async fn reset_round(&self) {
        self.call(Command::Reset).await;
    }

    /// Follow a host change.
    pub async fn set_host(&self, is_host: bool) {
        if self.commands.send(Command::SetHost(is_host)).await.is_err() {
            debug!("voting client already stopped");
        }
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> VotingView {
        self.state.borrow().clone()
    }

    /// Receiver notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<VotingView> {
        self.state.clone()
    }

    /// Wait until the view satisfies `predicate`. `None` once stopped.
    pub async fn wait_for(&self, predicate: impl FnMut(&VotingView) -> bool) -> Option<VotingView> {
        let mut state = self.state.clone();
        state.wait_for(predicate).await.ok().map(|view| view.clone())
    }

    /// Tear down and wait for the background task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(%err, "voting client task failed");
            }
        }
    }

    async fn call(&self, command: impl FnOnce(Done) -> Command) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(command(reply)).await.is_ok() {
            let _ = done.await;
        }
    }
}

impl Drop for VotingClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker<S> {
    service: Arc<S>,
    engine: VotingEngine,
    state: watch::Sender<VotingView>,
    cancel: CancellationToken,
    commands: mpsc::Receiver<Command>,
    inflight: FuturesUnordered<BoxFuture<'static, Completion>>,
    stream: Option<Watch<VoteEvent>>,
}

impl<S: EstimationService> Worker<S> {
    async fn run(mut self) {
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
                    let _ = reply.send(());
                },
                event = next_event(&mut self.stream) => self.observe(event),
            }
            self.publish();
        }
        self.stream = None;
        debug!("voting client stopped");
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

    fn handle(&mut self, command: Command) {
        let service = Arc::clone(&self.service);
        match command {
            Command::Vote { value, reply } => {
                let Some(request) = self.engine.vote_request(&value) else {
                    let _ = reply.send(());
                    return;
                };
                self.spawn(async move {
                    let result = service.cast_vote(request).await;
                    Completion::Voted { value, result, reply }
                });
            },
            Command::Reveal(reply) => {
                let Some(request) = self.engine.reveal_request() else {
                    let _ = reply.send(());
                    return;
                };
                self.spawn(async move {
                    let result = service.reveal_votes(request).await;
                    Completion::Revealed { result, reply }
                });
            },
            Command::Reset(reply) => {
                let Some(request) = self.engine.reset_request() else {
                    let _ = reply.send(());
                    return;
                };
                self.spawn(async move {
                    let result = service.reset_round(request).await;
                    Completion::Reset { result, reply }
                });
            },
            Command::SetHost(is_host) => self.engine.set_host(is_host),
        }
    }

    fn spawn(&mut self, call: impl Future<Output = Completion> + Send + 'static) {
        self.inflight.push(call.boxed());
    }

    fn complete(&mut self, completion: Completion) -> Done {
        let (result, reply) = match completion {
            Completion::Voted { value, result, reply } => {
                (result.map(|()| self.engine.vote_cast(value)), reply)
            },
            Completion::Revealed { result, reply } => {
                (result.map(|response| self.engine.revealed(response.summary)), reply)
            },
            Completion::Reset { result, reply } => (result.map(|()| self.engine.round_reset()), reply),
        };
        if let Err(err) = result {
            warn!(%err, "voting request failed");
            self.engine.request_failed(err.to_string());
        }
        reply
    }

    fn observe(&mut self, event: WatchEvent<VoteEvent>) {
        match event {
            WatchEvent::Connected => self.engine.connected(),
            WatchEvent::Item(event) => self.engine.apply_event(event),
            WatchEvent::Disconnected { error, .. } => self.engine.disconnected(error),
            WatchEvent::Stopped => self.stream = None,
        }
    }
}

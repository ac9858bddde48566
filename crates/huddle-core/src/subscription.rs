//! Reconnecting event stream.
//!
//! # Architecture: Action-Based State Machine
//!
//! [`Subscription`] decides *when* to open, retry and stop; it performs no
//! I/O and returns [`SubscriptionAction`]s. [`Watch`] executes those actions
//! against a stream-opening function and the [`Environment`] clock, and
//! surfaces what happened as [`WatchEvent`]s.
//!
//! ```text
//! ┌──────┐ start ┌────────────┐ opened ┌───────────┐
//! │ Idle │──────>│ Connecting │───────>│ Connected │
//! └──────┘       └────────────┘        └───────────┘
//!                  ↑     │ failed            │ failed
//!          elapsed │     ↓                   │
//!                ┌─────────┐<────────────────┘
//!                │ Backoff │
//!                └─────────┘
//!
//! cancel  → Cancelled   (caller teardown, no error reported)
//! terminate → Terminated (application decided the stream is over)
//! ```
//!
//! Any stream end that was not preceded by `cancel` or `terminate` is a
//! failure, including a clean end of stream. Failures are always retried.

use std::{
    future::Future,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::{StreamExt, future::BoxFuture};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    backoff::{Backoff, BackoffConfig},
    env::{Environment, Sleep},
    error::ServiceError,
    service::EventStream,
};

/// Actions returned by the subscription state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    /// Open the stream now.
    Open,
    /// Open the stream again after `delay`.
    Retry {
        /// Time to wait.
        delay: Duration,
    },
    /// Drop the stream and any pending retry.
    Close,
}

/// Subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not started.
    Idle,
    /// Open requested.
    Connecting,
    /// Stream open.
    Connected,
    /// Waiting to retry.
    Backoff,
    /// Torn down by the caller.
    Cancelled,
    /// Stopped by the application.
    Terminated,
}

/// Reconnect policy for one stream.
#[derive(Debug, Clone)]
pub struct Subscription {
    state: SubscriptionState,
    backoff: Backoff,
}

impl Subscription {
    /// Idle subscription.
    pub fn new(config: BackoffConfig) -> Self {
        Self { state: SubscriptionState::Idle, backoff: Backoff::new(config) }
    }

    /// Current state.
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Whether the stream is currently open.
    pub fn is_connected(&self) -> bool {
        self.state == SubscriptionState::Connected
    }

    /// Whether no further actions will ever be produced.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, SubscriptionState::Cancelled | SubscriptionState::Terminated)
    }

    /// Consecutive failures since the last successful open.
    pub fn failures(&self) -> u32 {
        self.backoff.failures()
    }

    /// Begin. Only meaningful from `Idle`.
    pub fn start(&mut self) -> Vec<SubscriptionAction> {
        if self.state != SubscriptionState::Idle {
            return Vec::new();
        }
        self.state = SubscriptionState::Connecting;
        vec![SubscriptionAction::Open]
    }

    /// The stream opened.
    pub fn opened(&mut self) {
        if self.state == SubscriptionState::Connecting {
            self.state = SubscriptionState::Connected;
            self.backoff.reset();
        }
    }

    /// An event arrived. Counts as an open if the open was not observed.
    pub fn received(&mut self) {
        self.opened();
    }

    /// The stream failed to open, errored, or ended.
    pub fn failed(&mut self) -> Vec<SubscriptionAction> {
        match self.state {
            SubscriptionState::Idle | SubscriptionState::Connecting | SubscriptionState::Connected => {
                self.state = SubscriptionState::Backoff;
                vec![SubscriptionAction::Retry { delay: self.backoff.next_delay() }]
            },
            SubscriptionState::Backoff
            | SubscriptionState::Cancelled
            | SubscriptionState::Terminated => Vec::new(),
        }
    }

    /// The retry delay elapsed.
    pub fn retry_elapsed(&mut self) -> Vec<SubscriptionAction> {
        if self.state != SubscriptionState::Backoff {
            return Vec::new();
        }
        self.state = SubscriptionState::Connecting;
        vec![SubscriptionAction::Open]
    }

    /// Caller teardown. No retry, no error.
    pub fn cancel(&mut self) -> Vec<SubscriptionAction> {
        self.finish(SubscriptionState::Cancelled)
    }

    /// Application-level end, e.g. the room closed.
    pub fn terminate(&mut self) -> Vec<SubscriptionAction> {
        self.finish(SubscriptionState::Terminated)
    }

    fn finish(&mut self, state: SubscriptionState) -> Vec<SubscriptionAction> {
        if self.is_finished() {
            return Vec::new();
        }
        self.state = state;
        vec![SubscriptionAction::Close]
    }
}

/// What a [`Watch`] observed.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    /// The stream (re)opened.
    Connected,
    /// An event, in server order.
    Item(T),
    /// The stream was lost; a reopen is scheduled.
    Disconnected {
        /// `Connection lost: <reason>`.
        error: String,
        /// Delay before the reopen.
        retry_in: Duration,
    },
    /// Cancelled or terminated. Nothing follows.
    Stopped,
}

/// Handler verdict for [`Watch::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep watching.
    Continue,
    /// Stop without retrying.
    Terminate,
}

type OpenFn<T> = Box<dyn FnMut() -> BoxFuture<'static, Result<EventStream<T>, ServiceError>> + Send>;

enum Phase<T> {
    Idle,
    Opening(BoxFuture<'static, Result<EventStream<T>, ServiceError>>),
    Streaming(EventStream<T>),
    Waiting(Sleep),
    Stopped,
}

/// Async driver of a [`Subscription`].
///
/// [`Watch::next`] is cancel safe: all progress lives in the watch itself, so
/// it can sit in a `tokio::select!` next to other branches.
pub struct Watch<T> {
    machine: Subscription,
    open: OpenFn<T>,
    env: Arc<dyn Environment>,
    phase: Phase<T>,
    cancelled: Sleep,
}

impl<T> std::fmt::Debug for Watch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch").field("machine", &self.machine).finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Watch<T> {
    /// Watch the streams produced by `open`, stopping when `cancel` fires.
    ///
    /// Nothing is opened until the first call to [`Watch::next`].
    pub fn new<F>(
        open: F,
        config: BackoffConfig,
        env: Arc<dyn Environment>,
        cancel: CancellationToken,
    ) -> Self
    where
        F: FnMut() -> BoxFuture<'static, Result<EventStream<T>, ServiceError>> + Send + 'static,
    {
        Self {
            machine: Subscription::new(config),
            open: Box::new(open),
            env,
            phase: Phase::Idle,
            cancelled: Box::pin(cancel.cancelled_owned()),
        }
    }

    /// Reconnect state.
    pub fn state(&self) -> SubscriptionState {
        self.machine.state()
    }

    /// Whether [`Watch::next`] will only ever return [`WatchEvent::Stopped`].
    pub fn is_stopped(&self) -> bool {
        matches!(self.phase, Phase::Stopped)
    }

    /// Stop without retrying.
    pub fn terminate(&mut self) {
        let actions = self.machine.terminate();
        self.execute(actions);
    }

    /// Next observation.
    pub async fn next(&mut self) -> WatchEvent<T> {
        std::future::poll_fn(|cx| self.poll_event(cx)).await
    }

    /// Feed every observation to `handler` until cancelled or terminated.
    pub async fn run<F>(mut self, mut handler: F)
    where
        F: FnMut(WatchEvent<T>) -> Flow,
    {
        loop {
            let event = self.next().await;
            let stopped = matches!(event, WatchEvent::Stopped);
            if handler(event) == Flow::Terminate {
                self.terminate();
                return;
            }
            if stopped {
                return;
            }
        }
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<WatchEvent<T>> {
        if !self.is_stopped() && self.cancelled.as_mut().poll(cx).is_ready() {
            debug!("watch cancelled");
            let actions = self.machine.cancel();
            self.execute(actions);
            self.phase = Phase::Stopped;
            return Poll::Ready(WatchEvent::Stopped);
        }

        loop {
            match &mut self.phase {
                Phase::Idle => {
                    let actions = self.machine.start();
                    self.execute_or_stop(actions);
                },
                Phase::Opening(open) => match open.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(stream)) => {
                        self.machine.opened();
                        self.phase = Phase::Streaming(stream);
                        return Poll::Ready(WatchEvent::Connected);
                    },
                    Poll::Ready(Err(err)) => return Poll::Ready(self.fail(&err)),
                },
                Phase::Streaming(stream) => match stream.poll_next_unpin(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Some(Ok(item))) => {
                        self.machine.received();
                        return Poll::Ready(WatchEvent::Item(item));
                    },
                    Poll::Ready(Some(Err(err))) => return Poll::Ready(self.fail(&err)),
                    Poll::Ready(None) => return Poll::Ready(self.fail(&ServiceError::StreamEnded)),
                },
                Phase::Waiting(sleep) => match sleep.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(()) => {
                        let actions = self.machine.retry_elapsed();
                        self.execute_or_stop(actions);
                    },
                },
                Phase::Stopped => return Poll::Ready(WatchEvent::Stopped),
            }
        }
    }

    fn fail(&mut self, err: &ServiceError) -> WatchEvent<T> {
        let actions = self.machine.failed();
        let retry_in = actions.iter().find_map(|action| match action {
            SubscriptionAction::Retry { delay } => Some(*delay),
            SubscriptionAction::Open | SubscriptionAction::Close => None,
        });
        self.execute_or_stop(actions);

        match retry_in {
            Some(retry_in) => {
                warn!(%err, failures = self.machine.failures(), ?retry_in, "stream lost");
                WatchEvent::Disconnected { error: format!("Connection lost: {err}"), retry_in }
            },
            None => WatchEvent::Stopped,
        }
    }

    fn execute_or_stop(&mut self, actions: Vec<SubscriptionAction>) {
        if actions.is_empty() {
            self.phase = Phase::Stopped;
        } else {
            self.execute(actions);
        }
    }

    fn execute(&mut self, actions: Vec<SubscriptionAction>) {
        for action in actions {
            match action {
                SubscriptionAction::Open => {
                    debug!(attempt = self.machine.failures() + 1, "opening stream");
                    self.phase = Phase::Opening((self.open)());
                },
                SubscriptionAction::Retry { delay } => {
                    self.phase = Phase::Waiting(self.env.sleep(delay));
                },
                SubscriptionAction::Close => self.phase = Phase::Stopped,
            }
        }
    }
}

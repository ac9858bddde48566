//! Room and voting synchronization for huddle clients.
//!
//! Two cooperating engines keep a local view of a shared estimation room
//! consistent with the remote authority:
//!
//! - [`RoomEngine`]: membership, host role, round phase and topic
//! - [`VotingEngine`]: who has voted, the caller's vote and revealed results
//!
//! Both are pure state machines. Actions that need the network are split into
//! a request builder, which applies client-side gating, and a completion
//! handler. Server events are applied with [`RoomEngine::apply_event`] and
//! [`VotingEngine::apply_event`]; they are the source of truth and overwrite
//! optimistic local writes.
//!
//! [`RoomClient`] and [`VotingClient`] run each engine in its own task,
//! executing engine actions against the identity store and a reconnecting
//! event stream, and publish every state change on a watch channel.

mod config;
mod error;
#[cfg(feature = "transport")]
pub mod http;
mod room;
mod runtime;
mod voting;

pub use config::ClientConfig;
pub use error::ClientError;
pub use room::{RoomAction, RoomEngine, RoomView, Seat, KICKED_MESSAGE};
pub use runtime::{RoomClient, VotingClient};
pub use voting::{VoteStatus, VotingEngine, VotingView};

//! Terminal client for huddle
//!
//! A thin shell over [`huddle_client::RoomClient`] and
//! [`huddle_client::VotingClient`]: it parses typed commands, forwards them to
//! the clients and logs what changes. All synchronization logic lives in
//! `huddle-client`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod commands;
pub mod session;

pub use commands::Command;
pub use session::{Session, SessionError, Step};

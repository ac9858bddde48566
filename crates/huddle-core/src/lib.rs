//! Huddle client core
//!
//! Everything a huddle client needs below the room and voting engines:
//! a persistent anonymous identity, a reconnecting subscription for
//! server-pushed event streams, the remote service contracts, and the card
//! deck validator.
//!
//! # Architecture
//!
//! Time, sleeping and randomness are reached only through [`Environment`], so
//! the same code runs against the system clock in production and against a
//! seeded, paused clock in tests. Reconnection policy is a pure state machine
//! ([`Subscription`]) that returns declarative actions; [`Watch`] is the thin
//! async driver that executes them.
//!
//! # Components
//!
//! - [`mod@env`]: Environment abstraction (clock, sleep, RNG)
//! - [`storage`]: Key/value persistence backends
//! - [`identity`]: Identity & session store
//! - [`backoff`]: Bounded exponential retry delays
//! - [`subscription`]: Reconnecting event stream
//! - [`service`]: Room and estimation service contracts
//! - [`cards`]: Card deck presets and the custom deck validator
//! - [`error`]: Error types

pub mod backoff;
pub mod cards;
pub mod env;
pub mod error;
pub mod identity;
mod namegen;
pub mod service;
pub mod storage;
pub mod subscription;

pub use backoff::{Backoff, BackoffConfig};
pub use env::{Environment, SystemEnv};
pub use error::{CardError, ServiceError, StorageError};
pub use identity::{IdentityStore, UserIdentity};
pub use namegen::generate_name;
pub use service::{EstimationService, EventStream, RoomService};
pub use storage::{KeyValueStore, MemoryStore, RedbStore};
pub use subscription::{Flow, Subscription, SubscriptionAction, SubscriptionState, Watch, WatchEvent};

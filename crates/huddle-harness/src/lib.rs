//! Deterministic simulation harness for huddle clients.
//!
//! A seeded [`Environment`](huddle_core::Environment) driven by tokio's clock
//! and an in-memory remote authority that implements both service contracts,
//! with hooks for severing streams and failing stream opens. Together they let
//! integration tests run multi-tab scenarios under a paused clock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authority;
pub mod sim_env;

pub use authority::MemoryAuthority;
pub use sim_env::SimEnv;

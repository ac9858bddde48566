//! Wire model for the huddle room and estimation services.
//!
//! The remote authority speaks Connect-style JSON: unary calls are a single
//! JSON body in each direction, server streams are newline-delimited JSON where
//! every line wraps one message as `{"result": ...}`. This crate owns the
//! message shapes and the incremental line decoder; it performs no I/O.
//!
//! # Compatibility
//!
//! Field names are camelCase. 64-bit integers are accepted both as JSON numbers
//! and as decimal strings, and enums both by their canonical name
//! (`ROOM_STATE_VOTING`) and by number, so payloads produced by either a
//! protobuf JSON encoder or a hand-written server decode the same way.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod de;
pub mod errors;
pub mod estimation;
pub mod events;
pub mod frame;
pub mod room;
pub mod rpc;

pub use errors::{ProtocolError, Result};
pub use estimation::{Vote, VoteSummary};
pub use events::{RoomEvent, VoteEvent};
pub use frame::{Envelope, FrameDecoder, MAX_LINE_SIZE, decode_line};
pub use room::{Card, CardConfig, CardPreset, Participant, Room, RoomState};
pub use rpc::Method;

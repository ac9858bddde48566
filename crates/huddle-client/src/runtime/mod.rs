//! Async runtimes for the engines.
//!
//! Each client is a handle plus one background task. The task owns its
//! engine exclusively and multiplexes four inputs with `tokio::select!`:
//! cancellation, commands from the handle, completions of in-flight remote
//! calls, and the next observation of its event stream. Each input is handled
//! to completion before the next is taken, so event application never
//! interleaves with action completion. After every input the engine view is
//! published on a watch channel.

mod room;
mod voting;

use huddle_core::{Watch, WatchEvent};

pub use room::RoomClient;
pub use voting::VotingClient;

/// Next observation of an optional watch; pending forever without one.
async fn next_event<T: Send + 'static>(watch: &mut Option<Watch<T>>) -> WatchEvent<T> {
    match watch {
        Some(watch) => watch.next().await,
        None => std::future::pending().await,
    }
}

//! Shared setup for client integration tests.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use huddle_client::{ClientConfig, RoomClient, Seat, VotingClient};
use huddle_core::{Environment, IdentityStore};
use huddle_harness::{MemoryAuthority, SimEnv};

/// One authority plus the environment every client shares.
pub struct World {
    pub env: Arc<dyn Environment>,
    pub authority: Arc<MemoryAuthority>,
}

impl World {
    pub fn new(seed: u64) -> Self {
        let env: Arc<dyn Environment> = Arc::new(SimEnv::with_seed(seed));
        let authority = Arc::new(MemoryAuthority::new(Arc::clone(&env)));
        Self { env, authority }
    }

    /// A fresh browser profile.
    pub fn profile(&self) -> Arc<IdentityStore> {
        Arc::new(IdentityStore::in_memory(Arc::clone(&self.env)))
    }

    /// A tab on `profile`, optionally opened at `room`.
    pub fn tab(&self, profile: &Arc<IdentityStore>, room: Option<&str>) -> RoomClient {
        RoomClient::spawn(
            Arc::clone(&self.authority),
            Arc::clone(profile),
            Arc::clone(&self.env),
            ClientConfig::default(),
            room,
        )
    }

    /// Voting for a seated tab.
    pub fn voting(&self, tab: &RoomClient) -> VotingClient {
        let view = tab.view();
        let seat = view.seat().unwrap_or_else(|| Seat {
            room_id: String::new(),
            participant_id: String::new(),
            session_token: String::new(),
        });
        VotingClient::spawn(
            Arc::clone(&self.authority),
            seat,
            view.is_host,
            view.is_spectator,
            Arc::clone(&self.env),
            ClientConfig::default(),
        )
    }
}

/// Let every task run until idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

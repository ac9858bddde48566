//! Session driving against the in-memory authority.

use std::{sync::Arc, time::Duration};

use huddle_cli::{Command, Session, SessionError, Step};
use huddle_client::ClientConfig;
use huddle_core::{Environment, IdentityStore, cards};
use huddle_harness::{MemoryAuthority, SimEnv};
use huddle_proto::{CardPreset, Method, RoomState};

struct World {
    env: Arc<dyn Environment>,
    authority: Arc<MemoryAuthority>,
}

impl World {
    fn new(seed: u64) -> Self {
        let env: Arc<dyn Environment> = Arc::new(SimEnv::with_seed(seed));
        let authority = Arc::new(MemoryAuthority::new(Arc::clone(&env)));
        Self { env, authority }
    }

    fn profile(&self) -> Arc<IdentityStore> {
        Arc::new(IdentityStore::in_memory(Arc::clone(&self.env)))
    }

    async fn host(&self, profile: Arc<IdentityStore>) -> Session<MemoryAuthority> {
        let deck = cards::preset_config(CardPreset::TShirt);
        Session::create(
            Arc::clone(&self.authority),
            profile,
            Arc::clone(&self.env),
            ClientConfig::default(),
            Some("Host"),
            deck,
        )
        .await
        .unwrap()
    }

    async fn guest(
        &self,
        profile: Arc<IdentityStore>,
        room: &str,
        name: Option<&str>,
    ) -> Result<Session<MemoryAuthority>, SessionError> {
        Session::join(
            Arc::clone(&self.authority),
            profile,
            Arc::clone(&self.env),
            ClientConfig::default(),
            room,
            name,
            false,
        )
        .await
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn room_name(session: &Session<MemoryAuthority>) -> String {
    session.room().view().room_name().unwrap_or_default().to_owned()
}

#[tokio::test(start_paused = true)]
async fn scripted_round() {
    let world = World::new(1);
    let mut host = world.host(world.profile()).await;
    let room = room_name(&host);
    settle().await;

    let script: &[u8] = b"/topic Login page\n/start\nM\n/reveal\n/q\n";
    host.run(tokio::io::BufReader::new(script)).await.unwrap();
    settle().await;

    assert_eq!(world.authority.calls(Method::SetTopic), 1);
    assert_eq!(world.authority.calls(Method::RevealVotes), 1);
    let votes = world.authority.votes(&room);
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].value, "M");
    assert_eq!(host.room().view().topic(), "Login page");
    host.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn voting_follows_the_seat() {
    let world = World::new(2);
    let mut host = world.host(world.profile()).await;
    assert!(host.votes().is_none());

    assert_eq!(host.sync().await, Step::Continue);
    assert!(host.votes().is_some_and(|votes| votes.view().is_host));

    assert_eq!(host.execute(Command::StartRound).await, Step::Continue);
    host.execute(Command::Vote { value: "L".into() }).await;
    let current = host.votes().and_then(|votes| votes.view().current_vote);
    assert_eq!(current.as_deref(), Some("L"));
    assert_eq!(host.room().view().state(), RoomState::Voting);
}

#[tokio::test(start_paused = true)]
async fn guests_are_stopped_before_host_actions() {
    let world = World::new(3);
    let host = world.host(world.profile()).await;
    let room = room_name(&host);
    let mut guest = world.guest(world.profile(), &room, Some("Guest")).await.unwrap();
    guest.sync().await;

    let host_id = host.room().view().participant_id.unwrap();
    guest.execute(Command::Kick { participant_id: host_id.clone() }).await;
    guest.execute(Command::Transfer { participant_id: host_id }).await;
    guest.execute(Command::Topic { topic: "mine".into() }).await;
    guest.execute(Command::Reveal).await;

    assert_eq!(world.authority.calls(Method::KickParticipant), 0);
    assert_eq!(world.authority.calls(Method::TransferOwnership), 0);
    assert_eq!(world.authority.calls(Method::SetTopic), 0);
    assert_eq!(world.authority.calls(Method::RevealVotes), 0);
}

#[tokio::test(start_paused = true)]
async fn remembered_seat_is_reclaimed_without_a_name() {
    let world = World::new(4);
    let host = world.host(world.profile()).await;
    let room = room_name(&host);
    let profile = world.profile();

    let first = world.guest(Arc::clone(&profile), &room, Some("Alice")).await.unwrap();
    let seat = first.room().view().participant_id;
    first.shutdown().await;

    let again = world.guest(profile, &room, None).await.unwrap();
    settle().await;
    assert_eq!(again.room().view().participant_id, seat);
    assert_eq!(again.room().view().me().map(|p| p.name.clone()).as_deref(), Some("Alice"));
    assert_eq!(host.room().view().participants().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn joining_a_missing_room_fails() {
    let world = World::new(5);
    let result = world.guest(world.profile(), "nowhere", Some("Guest")).await;
    assert!(matches!(result, Err(SessionError::Client(_))));
}

#[tokio::test(start_paused = true)]
async fn kick_ends_the_session() {
    let world = World::new(6);
    let host = world.host(world.profile()).await;
    let room = room_name(&host);
    let mut guest = world.guest(world.profile(), &room, Some("Guest")).await.unwrap();
    assert_eq!(guest.sync().await, Step::Continue);
    settle().await;

    let guest_id = guest.room().view().participant_id.unwrap();
    host.room().kick_participant(&guest_id).await;
    settle().await;

    assert_eq!(guest.sync().await, Step::Exit);
    assert!(guest.votes().is_none());
}

#[tokio::test(start_paused = true)]
async fn leave_exits() {
    let world = World::new(7);
    let host = world.host(world.profile()).await;
    let room = room_name(&host);
    let mut guest = world.guest(world.profile(), &room, Some("Guest")).await.unwrap();
    settle().await;

    assert_eq!(guest.execute(Command::Leave).await, Step::Exit);
    settle().await;
    assert_eq!(host.room().view().participants().len(), 1);
}

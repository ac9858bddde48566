//! Room engine scenarios against the in-memory authority.
//!
//! Every test runs on tokio's paused clock, so stream retries and scheduling
//! are deterministic.

mod common;

use common::{World, settle};
use huddle_client::{ClientError, KICKED_MESSAGE};
use huddle_core::ServiceError;
use huddle_proto::{Method, RoomState};

#[tokio::test(start_paused = true)]
async fn create_room_seats_the_host() {
    let world = World::new(1);
    let profile = world.profile();
    let host = world.tab(&profile, None);

    let room = host.create_room("Host", None).await.unwrap();
    settle().await;

    let view = host.view();
    assert_eq!(view.room_name(), Some(room.as_str()));
    assert!(view.is_host);
    assert!(view.is_connected);
    assert!(!view.is_loading);
    assert_eq!(view.state(), RoomState::Waiting);
    assert_eq!(profile.room_participant_id(&room), view.participant_id);
    assert!(profile.last_visited(&room).is_some());
    assert_eq!(world.authority.room_watchers(&room), 1);
}

#[tokio::test(start_paused = true)]
async fn join_failure_is_returned_and_recorded() {
    let world = World::new(2);
    let guest = world.tab(&world.profile(), None);

    let err = guest.join_room("no-such-room", "Guest", false).await.unwrap_err();

    assert_eq!(err, ClientError::Service(ServiceError::rpc("not_found", "room not found")));
    let view = guest.view();
    assert_eq!(view.error.as_deref(), Some("room not found"));
    assert!(!view.is_loading);
    assert!(view.room.is_none());
}

#[tokio::test(start_paused = true)]
async fn spectator_join_is_seated_but_not_counted() {
    let world = World::new(14);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();
    let watcher = world.tab(&world.profile(), None);

    watcher.join_room(&room, "Watcher", true).await.unwrap();
    settle().await;

    let view = watcher.view();
    assert!(view.is_spectator);
    assert!(!view.is_host);
    assert!(view.seat().is_some());
    assert!(view.participants().iter().any(|p| p.name == "Watcher" && p.is_spectator));

    let view = host.view();
    assert!(!view.is_spectator);
    assert_eq!(view.participants().len(), 2);
    assert_eq!(view.total_voters(), 1);
}

#[tokio::test(start_paused = true)]
async fn reload_reclaims_seat_without_duplicates() {
    let world = World::new(3);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();

    let shared = world.profile();
    let first = world.tab(&shared, None);
    first.join_room(&room, "Alice", false).await.unwrap();
    let second = world.tab(&shared, None);
    second.join_room(&room, "Alice", false).await.unwrap();
    settle().await;

    let alice = first.view().participant_id;
    assert_eq!(second.view().participant_id, alice);

    drop(second);
    let reloaded = world.tab(&shared, Some(&room));
    let view = reloaded.wait_for(|v| v.room.is_some()).await.unwrap();
    settle().await;

    assert_eq!(view.participant_id, alice);
    assert_eq!(view.me().map(|p| p.name.as_str()), Some("Alice"));
    assert_eq!(view.participants().len(), 2);
    assert_eq!(first.view().participants(), reloaded.view().participants());
    assert_eq!(host.view().participants().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn reload_without_mapping_waits_for_join() {
    let world = World::new(4);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();

    let stranger = world.tab(&world.profile(), Some(&room));
    settle().await;

    assert!(stranger.view().room.is_none());
    assert_eq!(world.authority.calls(Method::JoinRoom), 0);
}

#[tokio::test(start_paused = true)]
async fn voluntary_leave_keeps_mapping_and_kick_clears_it() {
    let world = World::new(5);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();
    let profile = world.profile();
    let guest = world.tab(&profile, None);
    guest.join_room(&room, "Guest", false).await.unwrap();
    settle().await;
    let seat = guest.view().participant_id.unwrap();

    guest.leave_room().await;
    settle().await;

    let view = guest.view();
    assert!(view.room.is_none());
    assert_eq!(view.error, None);
    assert_eq!(profile.room_participant_id(&room).as_deref(), Some(seat.as_str()));
    assert_eq!(host.view().participants().len(), 1);

    let guest = world.tab(&profile, Some(&room));
    guest.wait_for(|v| v.room.is_some()).await.unwrap();
    settle().await;
    assert_eq!(guest.view().participant_id.as_deref(), Some(seat.as_str()));
    assert_eq!(host.view().participants().len(), 2);

    host.kick_participant(&seat).await;
    settle().await;

    let view = guest.view();
    assert_eq!(view.error.as_deref(), Some(KICKED_MESSAGE));
    assert!(view.room.is_none());
    assert_eq!(profile.room_participant_id(&room), None);
    assert_eq!(host.view().participants().len(), 1);
    assert_eq!(world.authority.room_watchers(&room), 1);
}

#[tokio::test(start_paused = true)]
async fn host_only_actions_are_gated_locally() {
    let world = World::new(6);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();
    let guest = world.tab(&world.profile(), None);
    guest.join_room(&room, "Guest", false).await.unwrap();
    let host_id = host.view().participant_id.unwrap();

    guest.kick_participant(&host_id).await;
    guest.transfer_ownership(&host_id).await;
    guest.set_topic("sneaky").await;

    assert_eq!(world.authority.calls(Method::KickParticipant), 0);
    assert_eq!(world.authority.calls(Method::TransferOwnership), 0);
    assert_eq!(world.authority.calls(Method::SetTopic), 0);
    assert_eq!(guest.view().error, None);
}

#[tokio::test(start_paused = true)]
async fn ownership_transfer_follows_events() {
    let world = World::new(7);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();
    let guest = world.tab(&world.profile(), None);
    guest.join_room(&room, "Guest", false).await.unwrap();
    settle().await;

    let guest_id = guest.view().participant_id.unwrap();
    host.transfer_ownership(&guest_id).await;
    settle().await;

    assert!(!host.view().is_host);
    assert!(guest.view().is_host);
    assert!(guest.view().me().is_some_and(|p| p.is_host));
}

#[tokio::test(start_paused = true)]
async fn topic_and_round_start_reach_every_tab() {
    let world = World::new(8);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();
    let guest = world.tab(&world.profile(), None);
    guest.join_room(&room, "Guest", false).await.unwrap();
    settle().await;

    host.set_topic("Login page").await;
    settle().await;
    assert_eq!(guest.view().topic(), "Login page");
    assert_eq!(guest.view().state(), RoomState::Voting);

    host.start_round().await;
    assert_eq!(host.view().state(), RoomState::Voting);
}

#[tokio::test(start_paused = true)]
async fn rejected_start_round_is_recorded() {
    let world = World::new(9);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();
    let guest = world.tab(&world.profile(), None);
    guest.join_room(&room, "Guest", false).await.unwrap();

    guest.start_round().await;

    assert_eq!(world.authority.calls(Method::StartRound), 1);
    assert_eq!(guest.view().error.as_deref(), Some("only the host can perform this action"));
    assert_eq!(guest.view().state(), RoomState::Waiting);
}

#[tokio::test(start_paused = true)]
async fn refresh_overwrites_snapshot() {
    let world = World::new(10);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();
    let guest = world.tab(&world.profile(), None);
    guest.join_room(&room, "Guest", false).await.unwrap();

    host.refresh().await;

    let view = host.view();
    assert_eq!(view.participants().len(), 2);
    assert!(view.is_host);
    assert_eq!(world.authority.calls(Method::GetRoom), 1);
}

#[tokio::test(start_paused = true)]
async fn room_closed_is_terminal() {
    let world = World::new(11);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();
    let profile = world.profile();
    let guest = world.tab(&profile, None);
    guest.join_room(&room, "Guest", false).await.unwrap();
    settle().await;

    assert!(world.authority.close_room(&room, "expired"));
    settle().await;

    let view = guest.view();
    assert_eq!(view.error.as_deref(), Some("Room closed: expired"));
    assert!(view.room.is_none());
    assert_eq!(profile.room_participant_id(&room), None);

    let opens = world.authority.calls(Method::WatchRoom);
    tokio::time::sleep(std::time::Duration::from_secs(120)).await;
    assert_eq!(world.authority.calls(Method::WatchRoom), opens);
}

//! Stream loss, backoff and cancellation on the paused clock.

mod common;

use std::time::Duration;

use common::{World, settle};
use huddle_proto::Method;

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_and_reset_after_success() {
    let world = World::new(1);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();
    settle().await;
    let opens = world.authority.calls(Method::WatchRoom);
    assert_eq!(opens, 1);

    world.authority.fail_next_opens(3);
    world.authority.sever_streams();
    settle().await;

    let view = host.view();
    assert!(!view.is_connected);
    assert_eq!(view.error.as_deref(), Some("Connection lost: connection reset"));
    assert!(view.room.is_some());

    // Delays after consecutive failures: 1s, 2s, 4s, 8s.
    let mut expected = opens;
    for delay in [1000, 2000, 4000, 8000] {
        advance(delay - 10).await;
        assert_eq!(world.authority.calls(Method::WatchRoom), expected);
        advance(10).await;
        expected += 1;
        assert_eq!(world.authority.calls(Method::WatchRoom), expected);
    }

    let view = host.view();
    assert!(view.is_connected);
    assert_eq!(view.error, None);
    assert_eq!(world.authority.room_watchers(&room), 1);

    // A success resets the delay to the floor.
    world.authority.sever_streams();
    settle().await;
    advance(1000).await;
    assert_eq!(world.authority.calls(Method::WatchRoom), expected + 1);
    assert!(host.view().is_connected);
}

#[tokio::test(start_paused = true)]
async fn delay_is_capped() {
    let world = World::new(2);
    let host = world.tab(&world.profile(), None);
    host.create_room("Host", None).await.unwrap();
    settle().await;

    world.authority.fail_next_opens(u32::MAX);
    world.authority.sever_streams();
    settle().await;

    // 1 + 2 + 4 + 8 + 16 seconds, then every 30 seconds.
    advance(31_000).await;
    let before = world.authority.calls(Method::WatchRoom);
    advance(29_990).await;
    assert_eq!(world.authority.calls(Method::WatchRoom), before);
    advance(10).await;
    assert_eq!(world.authority.calls(Method::WatchRoom), before + 1);
    advance(30_000).await;
    assert_eq!(world.authority.calls(Method::WatchRoom), before + 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_retrying() {
    let world = World::new(3);
    let host = world.tab(&world.profile(), None);
    host.create_room("Host", None).await.unwrap();
    settle().await;

    world.authority.fail_next_opens(u32::MAX);
    world.authority.sever_streams();
    advance(1500).await;
    let opens = world.authority.calls(Method::WatchRoom);

    host.shutdown().await;
    advance(120_000).await;
    assert_eq!(world.authority.calls(Method::WatchRoom), opens);
}

#[tokio::test(start_paused = true)]
async fn events_flow_again_after_reconnect() {
    let world = World::new(4);
    let host = world.tab(&world.profile(), None);
    let room = host.create_room("Host", None).await.unwrap();
    let host_votes = world.voting(&host);
    settle().await;

    world.authority.sever_streams();
    settle().await;
    assert!(!host_votes.view().is_connected);
    assert!(!host.view().is_connected);

    advance(1000).await;
    assert!(host_votes.view().is_connected);
    assert_eq!(host_votes.view().error, None);

    let guest = world.tab(&world.profile(), None);
    guest.join_room(&room, "Guest", false).await.unwrap();
    settle().await;
    assert_eq!(host.view().participants().len(), 2);
}

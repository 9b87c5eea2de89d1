//! Zombie connection reaper integration tests: state progression, peer
//! confirmation, and failure containment.

mod common;

use common::wait_until;
use meridian::reaper::{ConnectionState, ConnectionTable, ReaperTimings, ZombieReaper};
use meridian::time::{Clock, ManualClock, SystemClock};
use meridian::transport::{InProcessTransport, Transport, ZOMBIE_CHECK_TOPIC};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

fn timings() -> ReaperTimings {
    ReaperTimings {
        grace_window: Duration::from_secs(30),
        zombie_threshold: Duration::from_secs(120),
        scan_interval: Duration::from_secs(1),
        confirm_timeout: Duration::from_millis(50),
    }
}

fn reaper(
    node_id: &str,
    transport: &InProcessTransport,
    clock: ManualClock,
) -> ZombieReaper<ManualClock> {
    let handle: Arc<dyn Transport> = Arc::new(transport.clone());
    ZombieReaper::new(node_id, ConnectionTable::new(), handle, clock, timings())
}

#[tokio::test]
async fn fresh_activity_never_passes_suspect() {
    let transport = InProcessTransport::new();
    let clock = ManualClock::new();
    let reaper = reaper("node-a", &transport, clock.clone());
    let table = reaper.table();
    let id = Uuid::new_v4();
    table.register(id, "conn-1", clock.now());

    // Long idle, but the transport reports activity right before the scan.
    clock.advance(Duration::from_secs(600));
    table.touch(id, clock.now());
    let report = reaper.scan_once().await;
    assert_eq!(report.suspected, 0);
    assert_eq!(table.state(id), Some(ConnectionState::Active));

    // Repeated touches keep the record from ever crossing Suspect.
    for _ in 0..5 {
        clock.advance(Duration::from_secs(60));
        let report = reaper.scan_once().await;
        assert!(report.zombified == 0 && report.reaped == 0);
        table.touch(id, clock.now());
        assert_eq!(table.state(id), Some(ConnectionState::Active));
    }
}

#[tokio::test]
async fn unclaimed_zombie_is_reaped_and_resources_released() {
    let transport = InProcessTransport::new();
    let clock = ManualClock::new();
    let reaper = reaper("node-a", &transport, clock.clone());
    let table = reaper.table();
    let id = Uuid::new_v4();
    table.register(id, "conn-producer-1", clock.now());

    clock.advance(Duration::from_secs(600));
    let report = reaper.scan_once().await;
    assert_eq!(report.suspected, 1);
    assert_eq!(table.state(id), Some(ConnectionState::Suspect));

    // No peers exist, so confirmation times out and the zombie is reaped.
    let report = reaper.scan_once().await;
    assert_eq!(report.zombified, 1);
    assert_eq!(report.reaped, 1);
    assert!(table.is_empty());
    assert_eq!(transport.released(), vec!["conn-producer-1".to_string()]);
}

#[tokio::test]
async fn positive_peer_response_resets_to_active() {
    let transport = InProcessTransport::new();
    let clock = ManualClock::new();

    // Peer node owning the migrated connection, answering check requests.
    let peer = reaper("node-b", &transport, clock.clone());
    let id = Uuid::new_v4();
    peer.table().register(id, "conn-migrated", clock.now());
    let (_peer_shutdown_tx, peer_shutdown_rx) = watch::channel(false);
    let peer_listener = peer.subscribe_check_listener(peer_shutdown_rx).unwrap();

    let local = reaper("node-a", &transport, clock.clone());
    let table = local.table();
    table.register(id, "conn-local", clock.now());

    clock.advance(Duration::from_secs(600));
    local.scan_once().await;
    let report = local.scan_once().await;
    assert_eq!(report.zombified, 1);
    assert_eq!(report.revived, 1);
    assert_eq!(report.reaped, 0);
    assert_eq!(table.state(id), Some(ConnectionState::Active));
    assert!(transport.released().is_empty());

    drop(_peer_shutdown_tx);
    let _ = peer_listener.await;
}

#[tokio::test]
async fn release_failure_does_not_halt_the_scan() {
    let transport = InProcessTransport::new();
    transport.fail_release_of("conn-bad");
    let clock = ManualClock::new();
    let reaper = reaper("node-a", &transport, clock.clone());
    let table = reaper.table();
    let bad = Uuid::new_v4();
    let good = Uuid::new_v4();
    table.register(bad, "conn-bad", clock.now());
    table.register(good, "conn-good", clock.now());

    clock.advance(Duration::from_secs(600));
    reaper.scan_once().await;
    let report = reaper.scan_once().await;

    // Both are removed even though one release failed.
    assert_eq!(report.reaped, 2);
    assert_eq!(report.release_failures, 1);
    assert!(table.is_empty());
    assert_eq!(transport.released(), vec!["conn-good".to_string()]);
}

#[tokio::test]
async fn check_listener_vouches_only_for_locally_active_connections() {
    let transport = InProcessTransport::new();
    let clock = ManualClock::new();
    let responder = reaper("node-b", &transport, clock.clone());
    let known = Uuid::new_v4();
    responder.table().register(known, "conn-known", clock.now());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = responder.subscribe_check_listener(shutdown_rx).unwrap();

    let handle: Arc<dyn Transport> = Arc::new(transport.clone());

    // Known connection: a positive reply arrives.
    let mut replies = handle.subscribe("probe.reply.1").unwrap();
    let request = serde_json::json!({
        "connection_id": known,
        "requester_id": "node-x",
        "issued_at": "2026-01-01T00:00:00Z",
    });
    handle
        .publish_with_reply(
            ZOMBIE_CHECK_TOPIC,
            serde_json::to_vec(&request).unwrap(),
            "probe.reply.1",
        )
        .unwrap();
    let envelope = tokio::time::timeout(Duration::from_millis(500), replies.next())
        .await
        .expect("reply expected")
        .unwrap();
    let reply: serde_json::Value = serde_json::from_slice(&envelope.payload).unwrap();
    assert_eq!(reply["active"], serde_json::Value::Bool(true));
    assert_eq!(reply["responder_id"], "node-b");

    // Unknown connection: silence within the confirmation window.
    let mut silent = handle.subscribe("probe.reply.2").unwrap();
    let request = serde_json::json!({
        "connection_id": Uuid::new_v4(),
        "requester_id": "node-x",
        "issued_at": "2026-01-01T00:00:00Z",
    });
    handle
        .publish_with_reply(
            ZOMBIE_CHECK_TOPIC,
            serde_json::to_vec(&request).unwrap(),
            "probe.reply.2",
        )
        .unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(100), silent.next())
            .await
            .is_err()
    );

    drop(_shutdown_tx);
    let _ = listener.await;
}

#[tokio::test]
async fn killer_loop_reaps_idle_connections_end_to_end() {
    let transport = InProcessTransport::new();
    let handle: Arc<dyn Transport> = Arc::new(transport.clone());
    let reaper = ZombieReaper::new(
        "node-a",
        ConnectionTable::new(),
        handle,
        SystemClock,
        ReaperTimings {
            grace_window: Duration::from_millis(20),
            zombie_threshold: Duration::from_millis(40),
            scan_interval: Duration::from_millis(25),
            confirm_timeout: Duration::from_millis(20),
        },
    );
    let table = reaper.table();
    let id = Uuid::new_v4();
    table.register(id, "conn-idle", SystemClock.now());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = reaper.spawn_killer_loop(shutdown_rx);

    assert!(wait_until(Duration::from_secs(3), || table.is_empty()).await);
    assert_eq!(transport.released(), vec!["conn-idle".to_string()]);

    shutdown_tx.send(true).unwrap();
    let _ = loop_handle.await;
}

//! Poison notification pipeline tests: conservation under concurrency,
//! malformed-input containment, and the full broker wiring.

mod common;

use common::{in_process_transport, memory_store, test_config, wait_until};
use meridian::metadata::MetadataStore;
use meridian::poison::{PoisonListener, PoisonNotification, PoisonOutcome};
use meridian::runtime::BrokerNode;
use meridian::time::SystemClock;
use meridian::transport::{Transport, POISON_TOPIC};
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_concurrent_notification_is_persisted_exactly_once() {
    let (_memory, store) = memory_store();
    let (_transport, handle) = in_process_transport();
    let listener = PoisonListener::new(store.clone(), handle.clone());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = listener.subscribe(shutdown_rx).unwrap();

    const TOTAL: usize = 25;
    let mut publishers = Vec::new();
    for i in 0..TOTAL {
        let handle = handle.clone();
        publishers.push(tokio::spawn(async move {
            let notification = PoisonNotification::new(
                format!("payload-{i}").into_bytes(),
                3,
                "consumer crashed",
            );
            let bytes = serde_json::to_vec(&notification).unwrap();
            handle.publish(POISON_TOPIC, bytes).unwrap();
        }));
    }
    for publisher in publishers {
        publisher.await.unwrap();
    }

    assert!(
        wait_until(Duration::from_secs(3), || {
            store.poison_messages().is_ok_and(|m| m.len() == TOTAL)
        })
        .await
    );
    // Settle and re-count: nothing was persisted twice.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.poison_messages().unwrap().len(), TOTAL);
    assert_eq!(listener.dropped(), 0);

    drop(_shutdown_tx);
    let _ = task.await;
}

#[tokio::test]
async fn malformed_notification_is_skipped_without_stalling_the_stream() {
    let (_memory, store) = memory_store();
    let (_transport, handle) = in_process_transport();
    let listener = PoisonListener::new(store.clone(), handle.clone());

    let outcome = listener.handle_notification(b"{not json").await;
    assert_eq!(outcome, PoisonOutcome::Malformed);
    assert!(store.poison_messages().unwrap().is_empty());

    let valid = PoisonNotification::new(b"m1".to_vec(), 5, "timeout");
    let outcome = listener
        .handle_notification(&serde_json::to_vec(&valid).unwrap())
        .await;
    assert_eq!(outcome, PoisonOutcome::Recorded);

    let persisted = store.poison_messages().unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].original_payload, b"m1".to_vec());
    assert_eq!(persisted[0].failure_count, 5);
    assert_eq!(persisted[0].last_error, "timeout");
}

#[tokio::test]
async fn persist_failure_exhausts_retries_and_counts_the_drop() {
    let (memory, store) = memory_store();
    let (_transport, handle) = in_process_transport();
    let listener = PoisonListener::new(store.clone(), handle);

    memory.set_unreachable(true);
    let notification = PoisonNotification::new(b"m1".to_vec(), 2, "nack");
    let outcome = listener
        .handle_notification(&serde_json::to_vec(&notification).unwrap())
        .await;
    assert_eq!(outcome, PoisonOutcome::DroppedAfterRetries);
    assert_eq!(listener.dropped(), 1);

    // The store coming back does not resurrect the dropped message.
    memory.set_unreachable(false);
    assert!(store.poison_messages().unwrap().is_empty());
}

#[tokio::test]
async fn bootstrapped_node_records_poison_into_the_admin_backlog() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config("node-a", dir.path());
    let (_transport, handle) = in_process_transport();
    let node = BrokerNode::bootstrap(config, handle.clone(), SystemClock, None)
        .await
        .unwrap();

    let notification = PoisonNotification::new(b"undeliverable".to_vec(), 4, "max redeliveries");
    handle
        .publish(POISON_TOPIC, serde_json::to_vec(&notification).unwrap())
        .unwrap();

    let admin = node.admin().clone();
    assert!(
        wait_until(Duration::from_secs(3), move || {
            admin.poison_backlog().is_ok_and(|n| n == 1)
        })
        .await
    );
    node.shutdown().await.unwrap();
}

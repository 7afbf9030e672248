//! Integration tests for the background expiry sweeper.

#![cfg(feature = "async")]

use action_gate::infrastructure::mocks::MockClock;
use action_gate::{
    ActionGate, ActionKind, ExpirySweeper, GateConfig, InMemoryChallengeStore,
    InMemoryDuplicateStore, SweeperConfig, SweeperHandle, UserId,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Stores {
    duplicates: Arc<InMemoryDuplicateStore>,
    challenges: Arc<InMemoryChallengeStore>,
}

fn gate_with_stores(clock: &MockClock) -> (Arc<ActionGate>, Stores) {
    let stores = Stores {
        duplicates: Arc::new(InMemoryDuplicateStore::new()),
        challenges: Arc::new(InMemoryChallengeStore::new()),
    };
    let gate = ActionGate::builder(GateConfig::default())
        .with_clock(Arc::new(clock.clone()))
        .with_duplicate_store(stores.duplicates.clone())
        .with_challenge_store(stores.challenges.clone())
        .build()
        .unwrap();
    (Arc::new(gate), stores)
}

fn gate(clock: &MockClock) -> Arc<ActionGate> {
    gate_with_stores(clock).0
}

fn start(gate: &Arc<ActionGate>) -> SweeperHandle {
    ExpirySweeper::new(gate.clone(), SweeperConfig { interval_secs: 1 })
        .unwrap()
        .start()
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_purges_on_interval() {
    let clock = MockClock::new(Instant::now());
    let (gate, stores) = gate_with_stores(&clock);
    let user = UserId::from("42");
    let fp = gate.duplicates().fingerprint(&user, "answer.add").build();
    assert!(gate.duplicates().admit(&fp).is_admitted());
    gate.challenges().record_attempt(&user, ActionKind::Answer);

    let handle = start(&gate);

    // Nothing has expired yet
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(stores.duplicates.len(), 1);
    assert_eq!(stores.challenges.len(), 1);

    // Expired records are dropped on the next tick
    clock.advance(Duration::from_secs(600));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(stores.duplicates.is_empty());
    assert!(stores.challenges.is_empty());

    handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_task() {
    let clock = MockClock::new(Instant::now());
    let gate = gate(&clock);
    let handle = start(&gate);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!handle.is_finished());

    handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test(start_paused = true)]
async fn test_dropped_handle_keeps_sweeping() {
    let clock = MockClock::new(Instant::now());
    let (gate, stores) = gate_with_stores(&clock);
    let user = UserId::from("42");
    drop(start(&gate));

    let fp = gate.duplicates().fingerprint(&user, "answer.add").build();
    gate.duplicates().admit(&fp);
    clock.advance(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // The detached task removed the expired record
    assert!(stores.duplicates.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_shutdown_safety() {
    let clock = MockClock::new(Instant::now());
    let handles: Vec<_> = (0..5).map(|_| start(&gate(&clock))).collect();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    for handle in handles {
        handle.shutdown().await.expect("shutdown failed");
    }
}

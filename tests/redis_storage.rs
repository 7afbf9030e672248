//! Integration tests for Redis storage.
//!
//! These tests require a Redis instance running at `redis://127.0.0.1/`.
//! Tests are ignored by default - run with `cargo test --features redis-storage --test redis_storage -- --ignored`

#![cfg(feature = "redis-storage")]

use action_gate::application::ports::{ChallengeStore, DuplicateStore};
use action_gate::{
    Action, ActionError, ActionGate, ActionKind, Actor, ChallengeKey, Fingerprint, GateConfig,
    GateError, GateRequest, PermissionRule, RankRules, RedisStorage, RedisStorageConfig, UserId,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Check if Redis is available before running tests
async fn redis_available() -> bool {
    RedisStorage::connect("redis://127.0.0.1/").await.is_ok()
}

/// Create a test storage with unique prefix
async fn create_test_storage(test_name: &str) -> RedisStorage {
    let config = RedisStorageConfig {
        key_prefix: format!("test:{}:", test_name),
    };

    let storage = RedisStorage::connect_with_config("redis://127.0.0.1/", config)
        .await
        .expect("Failed to connect to Redis");
    storage.clear().await.expect("Failed to clear test keys");
    storage
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Redis
async fn test_redis_duplicate_admit_and_release() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at redis://127.0.0.1/");
        return;
    }

    let storage = create_test_storage("admit_release").await;
    let fp = Fingerprint::simple(&UserId::from("42"), "answer.add");
    let now = Instant::now();
    let window = Duration::from_secs(2);

    assert_eq!(storage.try_insert(&fp, now, window), Ok(true));
    assert_eq!(storage.try_insert(&fp, now, window), Ok(false));

    storage.remove(&fp).unwrap();
    // Releasing twice is harmless
    storage.remove(&fp).unwrap();

    assert_eq!(storage.try_insert(&fp, now, window), Ok(true));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Redis
async fn test_redis_duplicate_window_expires() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let storage = create_test_storage("window_expires").await;
    let fp = Fingerprint::simple(&UserId::from("42"), "answer.add");

    assert_eq!(
        storage.try_insert(&fp, Instant::now(), Duration::from_millis(100)),
        Ok(true)
    );
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(
        storage.try_insert(&fp, Instant::now(), Duration::from_millis(100)),
        Ok(true)
    );
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Redis
async fn test_redis_challenge_counter() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let storage = create_test_storage("challenge_counter").await;
    let key = ChallengeKey::new(&UserId::from("42"), ActionKind::Answer);
    let now = Instant::now();
    let window = Duration::from_secs(60);

    assert_eq!(storage.attempts(&key, now), Ok(0));
    for expected in 1..=5 {
        assert_eq!(storage.increment(&key, now, window), Ok(expected));
    }
    assert_eq!(storage.attempts(&key, now), Ok(5));

    storage.reset(&key).unwrap();
    assert_eq!(storage.attempts(&key, now), Ok(0));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Redis
async fn test_redis_prefixes_are_isolated() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let first = create_test_storage("isolated_a").await;
    let second = create_test_storage("isolated_b").await;
    let fp = Fingerprint::simple(&UserId::from("42"), "answer.add");
    let window = Duration::from_secs(2);

    assert_eq!(first.try_insert(&fp, Instant::now(), window), Ok(true));
    assert_eq!(second.try_insert(&fp, Instant::now(), window), Ok(true));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Redis
async fn test_redis_shared_between_gates() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    // Two gate instances behind a load balancer share one store
    let storage = Arc::new(create_test_storage("shared_gates").await);
    let rules = RankRules::new().with_rule(Action::AnswerAdd, PermissionRule::new(1));
    let build = || {
        ActionGate::builder(GateConfig::default().with_permissions(rules.clone()))
            .with_duplicate_store(storage.clone())
            .with_challenge_store(storage.clone())
            .build()
            .unwrap()
    };
    let first = build();
    let second = build();
    let actor = Actor::member("42", 10);
    let fingerprint = first
        .duplicates()
        .fingerprint(&actor.user_id, "answer.add")
        .field("content", "same")
        .build();

    let request = GateRequest::new(&actor, Action::AnswerAdd)
        .challenge(ActionKind::Answer)
        .fingerprint(fingerprint);
    let outcome: Result<(), ActionError<()>> = first.run(request.clone(), || Ok(()));
    assert!(outcome.is_ok());

    let outcome: Result<(), ActionError<()>> = second.run(request, || Ok(()));
    assert!(matches!(
        outcome.unwrap_err().gate(),
        Some(GateError::DuplicateRejected { .. })
    ));
    assert_eq!(
        second.challenges().attempts(&actor.user_id, ActionKind::Answer),
        Some(1)
    );
}

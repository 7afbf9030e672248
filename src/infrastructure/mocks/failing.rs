//! A store that is always down.

use crate::application::ports::{CaptchaVerifier, ChallengeStore, DuplicateStore};
use crate::domain::action::ActionKind;
use crate::domain::actor::UserId;
use crate::domain::challenge::{ChallengeKey, ChallengeToken};
use crate::domain::fingerprint::Fingerprint;
use crate::error::StoreError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Implements every store port and fails every call.
///
/// Counts calls so tests can check that an open circuit stops traffic.
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of port calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

impl DuplicateStore for FailingStore {
    fn try_insert(&self, _: &Fingerprint, _: Instant, _: Duration) -> Result<bool, StoreError> {
        self.fail()
    }

    fn remove(&self, _: &Fingerprint) -> Result<(), StoreError> {
        self.fail()
    }
}

impl ChallengeStore for FailingStore {
    fn attempts(&self, _: &ChallengeKey, _: Instant) -> Result<u32, StoreError> {
        self.fail()
    }

    fn increment(&self, _: &ChallengeKey, _: Instant, _: Duration) -> Result<u32, StoreError> {
        self.fail()
    }

    fn reset(&self, _: &ChallengeKey) -> Result<(), StoreError> {
        self.fail()
    }
}

impl CaptchaVerifier for FailingStore {
    fn verify(&self, _: &UserId, _: ActionKind, _: &ChallengeToken) -> Result<bool, StoreError> {
        self.fail()
    }
}

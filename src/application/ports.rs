//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports: in-process
//! DashMap stores, Redis stores, and the captcha verifier.
//!
//! Store operations are fallible. Components never pass a [`StoreError`] to
//! their callers; they log it and apply their configured `FailurePolicy`.

use crate::domain::action::ActionKind;
use crate::domain::actor::UserId;
use crate::domain::challenge::{ChallengeKey, ChallengeToken};
use crate::domain::fingerprint::Fingerprint;
use crate::error::StoreError;
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for duplicate records.
pub trait DuplicateStore: Send + Sync + Debug {
    /// Atomically create a record for `fingerprint` unless a live one exists.
    ///
    /// Returns `true` if a record was created (the request is admitted) and
    /// `false` if a live record already existed. An existing live record's
    /// expiry is never extended.
    fn try_insert(
        &self,
        fingerprint: &Fingerprint,
        now: Instant,
        window: Duration,
    ) -> Result<bool, StoreError>;

    /// Remove the record for `fingerprint`. Removing an absent record is not
    /// an error.
    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError>;

    /// Drop records that expired before `now`, returning how many were removed.
    ///
    /// Stores with native expiry (Redis) have nothing to do here.
    fn purge_expired(&self, _now: Instant) -> usize {
        0
    }
}

/// Port for challenge attempt counters.
pub trait ChallengeStore: Send + Sync + Debug {
    /// Attempts recorded in the live window, zero if there is none.
    fn attempts(&self, key: &ChallengeKey, now: Instant) -> Result<u32, StoreError>;

    /// Atomically add one attempt, opening a window of `window` length if none
    /// is live. Returns the new count.
    fn increment(
        &self,
        key: &ChallengeKey,
        now: Instant,
        window: Duration,
    ) -> Result<u32, StoreError>;

    /// Clear the counter after a passed verification.
    fn reset(&self, key: &ChallengeKey) -> Result<(), StoreError>;

    /// Drop windows that elapsed before `now`, returning how many were removed.
    fn purge_expired(&self, _now: Instant) -> usize {
        0
    }
}

/// Port for checking a captcha answer.
///
/// Implementations must consume the challenge on every check so an id is
/// never accepted twice.
pub trait CaptchaVerifier: Send + Sync + Debug {
    /// Check `token` against the challenge issued to `user` for `kind`.
    fn verify(
        &self,
        user: &UserId,
        kind: ActionKind,
        token: &ChallengeToken,
    ) -> Result<bool, StoreError>;

    /// Drop challenges that expired unanswered, returning how many were removed.
    fn purge_expired(&self, _now: Instant) -> usize {
        0
    }
}

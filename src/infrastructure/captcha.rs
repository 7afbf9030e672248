//! In-process captcha bookkeeping.
//!
//! Rendering the puzzle is left to the caller. [`IssuedChallenges`] only
//! remembers which answer belongs to which id, for whom and for what kind of
//! action, until the id is checked once or its lifetime ends.

use crate::application::ports::{CaptchaVerifier, Clock};
use crate::domain::action::ActionKind;
use crate::domain::actor::UserId;
use crate::domain::challenge::ChallengeToken;
use crate::error::StoreError;
use crate::infrastructure::storage::ShardedStorage;
use ahash::RandomState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct IssuedChallenge {
    user: UserId,
    kind: ActionKind,
    answer: String,
    expires_at: Instant,
}

/// Single-use captcha ids held in memory.
#[derive(Debug)]
pub struct IssuedChallenges {
    issued: ShardedStorage<String, IssuedChallenge>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    sequence: AtomicU64,
    salt: RandomState,
}

impl IssuedChallenges {
    /// Create an empty registry whose challenges live for `ttl`.
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            issued: ShardedStorage::new(),
            clock,
            ttl,
            sequence: AtomicU64::new(0),
            salt: RandomState::new(),
        }
    }

    /// Register the answer for a new challenge and return its id.
    ///
    /// Every call mints a fresh id, so a client can never be handed an id it
    /// has already used.
    pub fn issue(&self, user: &UserId, kind: ActionKind, answer: impl Into<String>) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = format!("{:016x}{:08x}", self.salt.hash_one(seq), seq);

        self.issued.insert(
            id.clone(),
            IssuedChallenge {
                user: user.clone(),
                kind,
                answer: answer.into(),
                expires_at: self.clock.now() + self.ttl,
            },
        );
        debug!(%user, %kind, "captcha issued");
        id
    }

    /// Number of outstanding challenges, expired ones included.
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

impl CaptchaVerifier for IssuedChallenges {
    fn verify(
        &self,
        user: &UserId,
        kind: ActionKind,
        token: &ChallengeToken,
    ) -> Result<bool, StoreError> {
        // Removed up front: a wrong answer burns the id too
        let Some(issued) = self.issued.remove(token.id.as_str()) else {
            return Ok(false);
        };

        Ok(issued.user == *user
            && issued.kind == kind
            && self.clock.now() < issued.expires_at
            && issued.answer.eq_ignore_ascii_case(token.answer.trim()))
    }

    fn purge_expired(&self, now: Instant) -> usize {
        self.issued.purge(|issued| now >= issued.expires_at)
    }
}

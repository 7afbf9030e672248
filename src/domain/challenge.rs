//! Challenge (captcha) escalation state.
//!
//! Each `(user, kind)` pair carries an attempt counter inside a fixed window.
//! The window opens on the first attempt and the counter implicitly restarts
//! at zero once it elapses.

use crate::domain::action::ActionKind;
use crate::domain::actor::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Escalation level derived from an attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeLevel {
    /// No attempts in the current window
    Clear,
    /// Some attempts, still below the threshold
    Armed,
    /// Threshold reached, a passed verification is required
    Required,
}

impl ChallengeLevel {
    /// Classify an attempt count against a threshold.
    ///
    /// A threshold of zero means verification is always required.
    pub fn from_attempts(attempts: u32, threshold: u32) -> Self {
        if attempts >= threshold {
            ChallengeLevel::Required
        } else if attempts == 0 {
            ChallengeLevel::Clear
        } else {
            ChallengeLevel::Armed
        }
    }

    /// Check if verification is required.
    pub fn is_required(&self) -> bool {
        matches!(self, ChallengeLevel::Required)
    }
}

/// Threshold and window for one action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeLimit {
    /// Attempts allowed before verification is required
    pub threshold: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl ChallengeLimit {
    /// Create a limit.
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold,
            window_secs: window.as_secs(),
        }
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for ChallengeLimit {
    fn default() -> Self {
        Self {
            threshold: 5,
            window_secs: 300,
        }
    }
}

/// Store key for challenge state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChallengeKey {
    pub user: UserId,
    pub kind: ActionKind,
}

impl ChallengeKey {
    pub fn new(user: &UserId, kind: ActionKind) -> Self {
        Self {
            user: user.clone(),
            kind,
        }
    }
}

impl fmt::Display for ChallengeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.user)
    }
}

/// Attempt counter for one `(user, kind)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeState {
    attempts: u32,
    expires_at: Instant,
}

impl ChallengeState {
    /// Open a fresh window with no attempts.
    pub fn open(now: Instant, window: Duration) -> Self {
        Self {
            attempts: 0,
            expires_at: now + window,
        }
    }

    /// Attempts recorded in the current window, zero once it has elapsed.
    pub fn attempts(&self, now: Instant) -> u32 {
        if self.is_expired(now) {
            0
        } else {
            self.attempts
        }
    }

    /// Check if the window has elapsed.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Record one attempt, reopening the window first if it has elapsed.
    ///
    /// Returns the new count.
    pub fn record(&mut self, now: Instant, window: Duration) -> u32 {
        if self.is_expired(now) {
            *self = Self::open(now, window);
        }
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// When the current window ends.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

/// A captcha answer submitted with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeToken {
    /// Identifier of the issued captcha
    pub id: String,
    /// The user's answer
    pub answer: String,
}

impl ChallengeToken {
    pub fn new(id: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            answer: answer.into(),
        }
    }
}

/// Result of checking a challenge token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Passed,
    Failed,
}

impl Verification {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verification::Passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(ChallengeLevel::from_attempts(0, 5), ChallengeLevel::Clear);
        assert_eq!(ChallengeLevel::from_attempts(4, 5), ChallengeLevel::Armed);
        assert_eq!(ChallengeLevel::from_attempts(5, 5), ChallengeLevel::Required);
        assert_eq!(ChallengeLevel::from_attempts(9, 5), ChallengeLevel::Required);
    }

    #[test]
    fn test_zero_threshold_always_required() {
        assert!(ChallengeLevel::from_attempts(0, 0).is_required());
    }

    #[test]
    fn test_state_counts_within_window() {
        let now = Instant::now();
        let window = Duration::from_secs(60);
        let mut state = ChallengeState::open(now, window);

        assert_eq!(state.record(now, window), 1);
        assert_eq!(state.record(now + Duration::from_secs(10), window), 2);
        assert_eq!(state.attempts(now + Duration::from_secs(59)), 2);
    }

    #[test]
    fn test_state_restarts_after_window() {
        let now = Instant::now();
        let window = Duration::from_secs(60);
        let mut state = ChallengeState::open(now, window);
        state.record(now, window);
        state.record(now, window);

        let later = now + Duration::from_secs(60);
        assert_eq!(state.attempts(later), 0);
        assert_eq!(state.record(later, window), 1);
        assert_eq!(state.expires_at(), later + window);
    }

    #[test]
    fn test_key_display() {
        let key = ChallengeKey::new(&UserId::from("42"), ActionKind::Answer);
        assert_eq!(key.to_string(), "answer:42");
    }
}

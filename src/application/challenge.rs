//! Captcha escalation per user and action kind.
//!
//! Each `(user, kind)` pair walks `Clear -> Armed -> Required` as attempts are
//! recorded. Only a passed verification brings it back to `Clear` early;
//! denials, failed verifications and unrelated traffic never do. The window
//! elapsing resets it lazily on the next read.

use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, FailurePolicy};
use crate::application::metrics::GateMetrics;
use crate::application::ports::{CaptchaVerifier, ChallengeStore, Clock};
use crate::domain::action::{Action, ActionKind};
use crate::domain::actor::UserId;
use crate::domain::challenge::{
    ChallengeKey, ChallengeLevel, ChallengeLimit, ChallengeToken, Verification,
};
use crate::error::{ConfigError, GateError, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Which actors skip the challenge entirely.
///
/// Exempt actors are neither challenged nor have their attempts recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeExemption {
    /// Everyone is subject to the challenge
    None,
    /// Admins and moderators are exempt
    #[default]
    Admins,
    /// Admins, or anyone whose rank passes the exemption action
    AdminsOrRank,
    /// Only admins whose rank also passes the exemption action
    AdminsWithRank,
}

/// Thresholds, windows and exemption policy for the challenge gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    pub exemption: ChallengeExemption,
    /// Rank rule consulted by the rank-based exemption policies
    pub exemption_action: Action,
    /// Applied when the challenge store cannot be read
    pub on_store_error: FailurePolicy,
    /// Lifetime of an issued captcha in seconds
    pub token_ttl_secs: u64,
    /// Limit for kinds without their own entry
    pub default: ChallengeLimit,
    pub kinds: BTreeMap<ActionKind, ChallengeLimit>,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            exemption: ChallengeExemption::default(),
            exemption_action: Action::LinkUrlLimit,
            on_store_error: FailurePolicy::FailClosed,
            token_ttl_secs: 300,
            default: ChallengeLimit::default(),
            kinds: BTreeMap::new(),
        }
    }
}

impl ChallengeConfig {
    /// Set the limit for one kind.
    pub fn with_limit(mut self, kind: ActionKind, limit: ChallengeLimit) -> Self {
        self.kinds.insert(kind, limit);
        self
    }

    /// The limit that applies to `kind`.
    pub fn limit(&self, kind: ActionKind) -> ChallengeLimit {
        self.kinds.get(&kind).copied().unwrap_or(self.default)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Reject zero-length windows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default.window_secs == 0 {
            return Err(ConfigError::Invalid(
                "challenge.default.window_secs must be greater than zero".to_string(),
            ));
        }
        if let Some((kind, _)) = self.kinds.iter().find(|(_, limit)| limit.window_secs == 0) {
            return Err(ConfigError::Invalid(format!(
                "challenge.kinds.{kind}.window_secs must be greater than zero"
            )));
        }
        if self.token_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "challenge.token_ttl_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-user, per-kind captcha escalation.
#[derive(Debug)]
pub struct ChallengeGate {
    config: ChallengeConfig,
    store: Arc<dyn ChallengeStore>,
    verifier: Arc<dyn CaptchaVerifier>,
    clock: Arc<dyn Clock>,
    breaker: CircuitBreaker,
    metrics: GateMetrics,
}

impl ChallengeGate {
    /// Create a gate with its own metrics and a default circuit breaker.
    pub fn new(
        config: ChallengeConfig,
        store: Arc<dyn ChallengeStore>,
        verifier: Arc<dyn CaptchaVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default(), clock.clone());
        Self {
            config,
            store,
            verifier,
            clock,
            breaker,
            metrics: GateMetrics::new(),
        }
    }

    /// Report into shared metrics.
    pub fn with_metrics(mut self, metrics: GateMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the circuit breaker protecting the store.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = CircuitBreaker::new(config, self.clock.clone());
        self
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The limit that applies to `kind`.
    pub fn limit(&self, kind: ActionKind) -> ChallengeLimit {
        self.config.limit(kind)
    }

    /// Check whether an actor skips the challenge.
    ///
    /// `rank_exempt` is whether the actor's rank passes
    /// [`ChallengeConfig::exemption_action`]; it is ignored by policies that
    /// do not consult rank.
    pub fn is_exempt(&self, is_admin: bool, rank_exempt: bool) -> bool {
        match self.config.exemption {
            ChallengeExemption::None => false,
            ChallengeExemption::Admins => is_admin,
            ChallengeExemption::AdminsOrRank => is_admin || rank_exempt,
            ChallengeExemption::AdminsWithRank => is_admin && rank_exempt,
        }
    }

    /// Attempts in the live window.
    ///
    /// Returns `None` if the store could not answer.
    pub fn attempts(&self, user: &UserId, kind: ActionKind) -> Option<u32> {
        let key = ChallengeKey::new(user, kind);
        let now = self.clock.now();
        self.call_store("attempts", &key, |store| store.attempts(&key, now))
    }

    /// Current escalation level.
    ///
    /// If the store cannot answer, the failure policy decides: fail-open
    /// reports `Clear`, fail-closed reports `Required`.
    pub fn level(&self, user: &UserId, kind: ActionKind) -> ChallengeLevel {
        let limit = self.limit(kind);
        if limit.threshold == 0 {
            return ChallengeLevel::Required;
        }

        match self.attempts(user, kind) {
            Some(attempts) => ChallengeLevel::from_attempts(attempts, limit.threshold),
            None if self.config.on_store_error.is_open() => ChallengeLevel::Clear,
            None => ChallengeLevel::Required,
        }
    }

    /// Check if the next attempt must carry a passed verification.
    pub fn is_required(&self, user: &UserId, kind: ActionKind) -> bool {
        self.level(user, kind).is_required()
    }

    /// Record one completed attempt, opening a window if none is live.
    ///
    /// Returns the new count, or `None` if the store could not be updated.
    pub fn record_attempt(&self, user: &UserId, kind: ActionKind) -> Option<u32> {
        let key = ChallengeKey::new(user, kind);
        let now = self.clock.now();
        let window = self.limit(kind).window();
        let count = self.call_store("increment", &key, |store| {
            store.increment(&key, now, window)
        })?;

        self.metrics.record_attempt();
        debug!(%key, attempts = count, "challenge attempt recorded");
        Some(count)
    }

    /// Verify a token, resetting the counter on a pass.
    ///
    /// A failed verification leaves the counter untouched. A verifier that
    /// cannot answer counts as a failure.
    pub fn verify_and_consume(
        &self,
        user: &UserId,
        kind: ActionKind,
        token: &ChallengeToken,
    ) -> Verification {
        let key = ChallengeKey::new(user, kind);
        let passed = match self.verifier.verify(user, kind, token) {
            Ok(passed) => passed,
            Err(e) => {
                self.metrics.record_store_failure();
                warn!(%key, error = %e, "captcha verifier failed, treating as not passed");
                false
            }
        };

        if !passed {
            self.metrics.record_challenge_failed();
            debug!(%key, "captcha verification failed");
            return Verification::Failed;
        }

        self.metrics.record_challenge_passed();
        self.call_store("reset", &key, |store| store.reset(&key));
        debug!(%key, "captcha verification passed, counter reset");
        Verification::Passed
    }

    /// Composed check used before a mutation.
    ///
    /// # Errors
    /// [`GateError::ChallengeRequired`] when verification is required and no
    /// token was supplied; the caller should issue a fresh challenge.
    /// [`GateError::ChallengeFailed`] when the supplied token did not verify.
    pub fn check(
        &self,
        user: &UserId,
        kind: ActionKind,
        token: Option<&ChallengeToken>,
    ) -> Result<(), GateError> {
        if !self.is_required(user, kind) {
            return Ok(());
        }

        let Some(token) = token else {
            self.metrics.record_challenge_required();
            return Err(GateError::ChallengeRequired { kind });
        };

        match self.verify_and_consume(user, kind, token) {
            Verification::Passed => Ok(()),
            Verification::Failed => Err(GateError::ChallengeFailed { kind }),
        }
    }

    /// Drop elapsed windows from stores without native expiry.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(self.clock.now())
    }

    /// Drop issued challenges that expired unanswered.
    pub fn purge_expired_tokens(&self) -> usize {
        self.verifier.purge_expired(self.clock.now())
    }

    fn call_store<T>(
        &self,
        operation: &'static str,
        key: &ChallengeKey,
        f: impl FnOnce(&dyn ChallengeStore) -> Result<T, StoreError>,
    ) -> Option<T> {
        if !self.breaker.allow_request() {
            debug!(operation, %key, "challenge store circuit open, skipping");
            return None;
        }

        match f(self.store.as_ref()) {
            Ok(value) => {
                self.breaker.record_success();
                Some(value)
            }
            Err(e) => {
                self.metrics.record_store_failure();
                warn!(
                    operation,
                    %key,
                    error = %e,
                    policy = ?self.config.on_store_error,
                    "challenge store failed"
                );
                if self.breaker.record_failure() {
                    warn!("challenge store circuit opened");
                }
                None
            }
        }
    }
}

//! Builder wiring an [`ActionGate`] from configuration and adapters.

use crate::application::challenge::ChallengeGate;
use crate::application::circuit_breaker::CircuitBreakerConfig;
use crate::application::metrics::GateMetrics;
use crate::application::permission::PermissionEvaluator;
use crate::application::pipeline::ActionGate;
use crate::application::ports::{CaptchaVerifier, ChallengeStore, Clock, DuplicateStore};
use crate::application::suppressor::DuplicateSuppressor;
use crate::error::ConfigError;
use crate::infrastructure::captcha::IssuedChallenges;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::GateConfig;
use crate::infrastructure::storage::{InMemoryChallengeStore, InMemoryDuplicateStore};
use std::sync::Arc;
use tracing::debug;

impl ActionGate {
    /// Create a builder for configuring the gate.
    ///
    /// Unless replaced, the gate uses:
    /// - `SystemClock`
    /// - in-process DashMap stores
    /// - an empty `IssuedChallenges` verifier; pass the registry you issue
    ///   captchas from with [`ActionGateBuilder::with_verifier`]
    pub fn builder(config: GateConfig) -> ActionGateBuilder {
        ActionGateBuilder {
            config,
            clock: None,
            duplicate_store: None,
            challenge_store: None,
            verifier: None,
            metrics: None,
        }
    }
}

/// Builder for [`ActionGate`].
#[derive(Debug)]
pub struct ActionGateBuilder {
    config: GateConfig,
    clock: Option<Arc<dyn Clock>>,
    duplicate_store: Option<Arc<dyn DuplicateStore>>,
    challenge_store: Option<Arc<dyn ChallengeStore>>,
    verifier: Option<Arc<dyn CaptchaVerifier>>,
    metrics: Option<GateMetrics>,
}

impl ActionGateBuilder {
    /// Read time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Store duplicate records in `store`.
    pub fn with_duplicate_store(mut self, store: Arc<dyn DuplicateStore>) -> Self {
        self.duplicate_store = Some(store);
        self
    }

    /// Store challenge counters in `store`.
    pub fn with_challenge_store(mut self, store: Arc<dyn ChallengeStore>) -> Self {
        self.challenge_store = Some(store);
        self
    }

    /// Check captcha answers with `verifier`.
    pub fn with_verifier(mut self, verifier: Arc<dyn CaptchaVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Override the `[circuit_breaker]` section.
    pub fn with_circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    /// Report into existing metrics.
    pub fn with_metrics(mut self, metrics: GateMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and build the gate.
    ///
    /// # Errors
    /// Returns the first error from [`GateConfig::validate`].
    pub fn build(self) -> Result<ActionGate, ConfigError> {
        self.config.validate()?;

        let GateConfig {
            permissions,
            challenge,
            duplicate,
            circuit_breaker,
            ..
        } = self.config;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let metrics = self.metrics.unwrap_or_default();
        let duplicate_store = self
            .duplicate_store
            .unwrap_or_else(|| Arc::new(InMemoryDuplicateStore::new()));
        let challenge_store = self
            .challenge_store
            .unwrap_or_else(|| Arc::new(InMemoryChallengeStore::new()));
        let verifier = self.verifier.unwrap_or_else(|| {
            Arc::new(IssuedChallenges::new(clock.clone(), challenge.token_ttl()))
        });

        debug!(
            rules = permissions.len(),
            duplicate_window_ms = duplicate.window_ms,
            exemption = ?challenge.exemption,
            "building action gate"
        );

        let permissions = PermissionEvaluator::with_metrics(Arc::new(permissions), metrics.clone());
        let challenges = ChallengeGate::new(challenge, challenge_store, verifier, clock.clone())
            .with_metrics(metrics.clone())
            .with_circuit_breaker(circuit_breaker);
        let duplicates = DuplicateSuppressor::new(duplicate, duplicate_store, clock)
            .with_metrics(metrics.clone())
            .with_circuit_breaker(circuit_breaker);

        Ok(ActionGate::new(permissions, challenges, duplicates, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{Action, ActionKind};
    use crate::domain::actor::Actor;
    use crate::domain::rank::{PermissionRule, RankRules};
    use crate::infrastructure::mocks::FailingStore;

    #[test]
    fn test_default_build() {
        let gate = ActionGate::builder(GateConfig::default()).build().unwrap();
        assert_eq!(gate.metrics().snapshot().admitted, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GateConfig::default();
        config.duplicate.window_ms = 0;
        assert!(matches!(
            ActionGate::builder(config).build(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_components_share_metrics() {
        let config = GateConfig::default()
            .with_permissions(RankRules::new().with_rule(Action::AnswerAdd, PermissionRule::new(1)));
        let metrics = GateMetrics::new();
        let gate = ActionGate::builder(config)
            .with_metrics(metrics.clone())
            .build()
            .unwrap();
        let actor = Actor::member("1", 5);

        gate.permissions().permits(actor.rank, &Action::AnswerAdd, false, false);
        gate.challenges().record_attempt(&actor.user_id, ActionKind::Answer);
        let fp = gate.duplicates().fingerprint(&actor.user_id, "answer.add").build();
        gate.duplicates().admit(&fp);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.permits, 1);
        assert_eq!(snapshot.attempts_recorded, 1);
        assert_eq!(snapshot.admitted, 1);
    }

    #[test]
    fn test_circuit_breaker_config_applies_to_stores() {
        let store = Arc::new(FailingStore::new());
        let gate = ActionGate::builder(GateConfig::default())
            .with_duplicate_store(store.clone())
            .with_circuit_breaker_config(CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout_secs: 60,
            })
            .build()
            .unwrap();

        let fp = gate
            .duplicates()
            .fingerprint(&"1".into(), "answer.add")
            .build();
        gate.duplicates().admit(&fp);
        gate.duplicates().admit(&fp);
        assert_eq!(store.calls(), 1);
    }
}

//! Duplicate submission suppression.
//!
//! A request is admitted by atomically creating a record for its
//! fingerprint. While the record is live, every other request with the same
//! fingerprint is rejected. The record disappears when the window elapses or
//! when the admitted request fails and releases it, so the user can retry
//! immediately.

use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, FailurePolicy};
use crate::application::metrics::GateMetrics;
use crate::application::ports::{Clock, DuplicateStore};
use crate::domain::actor::UserId;
use crate::domain::fingerprint::{Fingerprint, FingerprintBuilder};
use crate::error::{ConfigError, GateError, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Window, fingerprint and failure settings for duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressorConfig {
    /// How long an admitted fingerprint blocks duplicates, in milliseconds
    pub window_ms: u64,
    /// Payload fields left out of fingerprints
    pub excluded_fields: Vec<String>,
    pub on_store_error: FailurePolicy,
    /// Let admins and moderators skip duplicate suppression
    pub admins_bypass: bool,
}

impl Default for SuppressorConfig {
    fn default() -> Self {
        Self {
            window_ms: 2000,
            excluded_fields: ["request_id", "timestamp", "captcha_id", "captcha_code"]
                .into_iter()
                .map(String::from)
                .collect(),
            on_store_error: FailurePolicy::FailOpen,
            admins_bypass: false,
        }
    }
}

impl SuppressorConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::Invalid(
                "duplicate.window_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No live record existed; one was created
    Admitted,
    /// A live record already exists for this fingerprint
    Rejected,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Rejects concurrent duplicates of the same logical request.
#[derive(Debug)]
pub struct DuplicateSuppressor {
    config: SuppressorConfig,
    excluded: Arc<BTreeSet<String>>,
    store: Arc<dyn DuplicateStore>,
    clock: Arc<dyn Clock>,
    breaker: CircuitBreaker,
    metrics: GateMetrics,
}

impl DuplicateSuppressor {
    /// Create a suppressor with its own metrics and a default circuit breaker.
    pub fn new(
        config: SuppressorConfig,
        store: Arc<dyn DuplicateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let excluded = Arc::new(config.excluded_fields.iter().cloned().collect());
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default(), clock.clone());
        Self {
            config,
            excluded,
            store,
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

    pub fn config(&self) -> &SuppressorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Start a fingerprint that drops the configured volatile fields.
    pub fn fingerprint(&self, user: &UserId, action: impl Into<String>) -> FingerprintBuilder {
        FingerprintBuilder::with_excluded(user, action, self.excluded.clone())
    }

    /// Atomically admit a fingerprint unless a live record exists.
    ///
    /// A rejected admission never extends the existing record's expiry. When
    /// the store is unavailable the failure policy decides, and a fail-closed
    /// rejection is counted under `store_failures` only.
    pub fn admit(&self, fingerprint: &Fingerprint) -> Admission {
        let now = self.clock.now();
        let window = self.config.window();

        let admission = match self.call_store("admit", fingerprint, |store| {
            store.try_insert(fingerprint, now, window)
        }) {
            Some(true) => Admission::Admitted,
            Some(false) => {
                self.metrics.record_duplicate();
                Admission::Rejected
            }
            // Outages count as store failures, never as duplicates
            None if self.config.on_store_error.is_open() => Admission::Admitted,
            None => Admission::Rejected,
        };

        if admission.is_admitted() {
            self.metrics.record_admitted();
        }
        debug!(%fingerprint, ?admission, "duplicate check");
        admission
    }

    /// Remove a fingerprint's record so the request may be retried at once.
    ///
    /// Releasing an absent record is a no-op.
    pub fn release(&self, fingerprint: &Fingerprint) {
        if self
            .call_store("release", fingerprint, |store| store.remove(fingerprint))
            .is_some()
        {
            self.metrics.record_released();
            debug!(%fingerprint, "fingerprint released");
        }
    }

    /// Admit a fingerprint and tie its release to the returned guard.
    ///
    /// # Errors
    /// [`GateError::DuplicateRejected`] if a live record already exists.
    pub fn guard(&self, fingerprint: Fingerprint) -> Result<AdmissionGuard<'_>, GateError> {
        match self.admit(&fingerprint) {
            Admission::Admitted => Ok(AdmissionGuard {
                suppressor: self,
                fingerprint,
                armed: true,
            }),
            Admission::Rejected => Err(GateError::DuplicateRejected { fingerprint }),
        }
    }

    /// Drop expired records from stores without native expiry.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(self.clock.now())
    }

    fn call_store<T>(
        &self,
        operation: &'static str,
        fingerprint: &Fingerprint,
        f: impl FnOnce(&dyn DuplicateStore) -> Result<T, StoreError>,
    ) -> Option<T> {
        if !self.breaker.allow_request() {
            debug!(operation, %fingerprint, "duplicate store circuit open, skipping");
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
                    %fingerprint,
                    error = %e,
                    policy = ?self.config.on_store_error,
                    "duplicate store failed"
                );
                if self.breaker.record_failure() {
                    warn!("duplicate store circuit opened");
                }
                None
            }
        }
    }
}

/// An admitted fingerprint.
///
/// Dropping the guard releases the fingerprint. Call
/// [`complete`](Self::complete) after a successful outcome to keep the record
/// until its window elapses.
#[derive(Debug)]
#[must_use = "dropping the guard releases the fingerprint immediately"]
pub struct AdmissionGuard<'a> {
    suppressor: &'a DuplicateSuppressor,
    fingerprint: Fingerprint,
    armed: bool,
}

impl AdmissionGuard<'_> {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Keep the record; duplicates stay blocked for the rest of the window.
    pub fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.suppressor.release(&self.fingerprint);
        }
    }
}

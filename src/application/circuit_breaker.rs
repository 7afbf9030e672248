//! Circuit breaker and failure policy for backing stores.
//!
//! Every stateful component talks to a store that may fail (a Redis outage,
//! a verifier timeout). A failed call is resolved with the component's
//! [`FailurePolicy`]. After `failure_threshold` consecutive failures the
//! circuit opens: the store is skipped entirely and the policy applies
//! directly until `recovery_timeout` has elapsed, after which one probe is
//! let through.

use crate::application::ports::Clock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a component does when its store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Let the request through as if the store had said yes
    FailOpen,
    /// Treat the request as rejected
    FailClosed,
}

impl FailurePolicy {
    /// Check if this policy lets requests through.
    pub fn is_open(&self) -> bool {
        matches!(self, FailurePolicy::FailOpen)
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, the store is used normally
    Closed = 0,
    /// Circuit is open due to failures, the store is bypassed
    Open = 1,
    /// Circuit is testing if the store has recovered
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Seconds to wait before probing the store again
    pub recovery_timeout_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
        }
    }
}

/// Circuit breaker protecting one store.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    last_failure_nanos: AtomicU64,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    /// Reference point for the stored failure timestamp
    epoch: Instant,
}

impl CircuitBreaker {
    /// Create a circuit breaker reading time from `clock`.
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            last_failure_nanos: AtomicU64::new(0),
            config,
            clock,
            epoch,
        }
    }

    /// Get the current circuit state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Check whether the store should be called.
    ///
    /// Returns `false` while the circuit is open; the caller then applies its
    /// failure policy without touching the store.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .clock
                    .now()
                    .saturating_duration_since(self.last_failure_time());
                if elapsed < self.config.recovery_timeout() {
                    return false;
                }

                // Only one thread moves Open -> HalfOpen
                let result = self.state.compare_exchange(
                    CircuitState::Open as u8,
                    CircuitState::HalfOpen as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                result.is_ok() || self.state() == CircuitState::HalfOpen
            }
        }
    }

    /// Record a successful store call.
    pub fn record_success(&self) {
        if self.state() != CircuitState::Open {
            self.consecutive_failures.store(0, Ordering::Release);
            self.state
                .store(CircuitState::Closed as u8, Ordering::Release);
        }
    }

    /// Record a failed store call.
    ///
    /// Returns `true` if this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        let nanos = self
            .clock
            .now()
            .saturating_duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX);
        self.last_failure_nanos.store(nanos, Ordering::Release);

        match self.state() {
            CircuitState::HalfOpen => {
                self.state
                    .store(CircuitState::Open as u8, Ordering::Release);
                true
            }
            CircuitState::Closed if failures >= u64::from(self.config.failure_threshold) => {
                self.state
                    .compare_exchange(
                        CircuitState::Closed as u8,
                        CircuitState::Open as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            }
            _ => false,
        }
    }

    fn last_failure_time(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.last_failure_nanos.load(Ordering::Acquire))
    }

    /// Get the number of consecutive failures.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }
}

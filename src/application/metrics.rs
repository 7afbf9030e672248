//! Observability counters for the gate.
//!
//! One [`GateMetrics`] is shared by every component of an `ActionGate`, so a
//! single snapshot describes the whole pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for gating decisions.
///
/// Cloning is cheap; all clones update the same counters.
#[derive(Debug, Clone, Default)]
pub struct GateMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    admitted: AtomicU64,
    duplicates_rejected: AtomicU64,
    released: AtomicU64,
    permits: AtomicU64,
    denials: AtomicU64,
    configuration_missing: AtomicU64,
    challenges_required: AtomicU64,
    challenges_passed: AtomicU64,
    challenges_failed: AtomicU64,
    attempts_recorded: AtomicU64,
    store_failures: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $read:ident) => {
        pub(crate) fn $record(&self) {
            self.inner.$read.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $read(&self) -> u64 {
            self.inner.$read.load(Ordering::Relaxed)
        }
    };
}

impl GateMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_admitted, admitted);
    counter!(record_duplicate, duplicates_rejected);
    counter!(record_released, released);
    counter!(record_permit, permits);
    counter!(record_denial, denials);
    counter!(record_configuration_missing, configuration_missing);
    counter!(record_challenge_required, challenges_required);
    counter!(record_challenge_passed, challenges_passed);
    counter!(record_challenge_failed, challenges_failed);
    counter!(record_attempt, attempts_recorded);
    counter!(record_store_failure, store_failures);

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> GateMetricsSnapshot {
        GateMetricsSnapshot {
            admitted: self.admitted(),
            duplicates_rejected: self.duplicates_rejected(),
            released: self.released(),
            permits: self.permits(),
            denials: self.denials(),
            configuration_missing: self.configuration_missing(),
            challenges_required: self.challenges_required(),
            challenges_passed: self.challenges_passed(),
            challenges_failed: self.challenges_failed(),
            attempts_recorded: self.attempts_recorded(),
            store_failures: self.store_failures(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.admitted,
            &inner.duplicates_rejected,
            &inner.released,
            &inner.permits,
            &inner.denials,
            &inner.configuration_missing,
            &inner.challenges_required,
            &inner.challenges_passed,
            &inner.challenges_failed,
            &inner.attempts_recorded,
            &inner.store_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateMetricsSnapshot {
    pub admitted: u64,
    pub duplicates_rejected: u64,
    pub released: u64,
    pub permits: u64,
    pub denials: u64,
    pub configuration_missing: u64,
    /// Requests turned away for lacking a captcha answer
    pub challenges_required: u64,
    pub challenges_passed: u64,
    pub challenges_failed: u64,
    pub attempts_recorded: u64,
    pub store_failures: u64,
}

impl GateMetricsSnapshot {
    /// Share of admission attempts rejected as duplicates (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been admitted or rejected.
    pub fn duplicate_rate(&self) -> f64 {
        let total = self.admitted.saturating_add(self.duplicates_rejected);
        if total == 0 {
            0.0
        } else {
            self.duplicates_rejected as f64 / total as f64
        }
    }

    /// Share of permission evaluations that did not permit.
    pub fn denial_rate(&self) -> f64 {
        let refused = self.denials.saturating_add(self.configuration_missing);
        let total = self.permits.saturating_add(refused);
        if total == 0 {
            0.0
        } else {
            refused as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initial_state() {
        let metrics = GateMetrics::new();
        assert_eq!(metrics.snapshot(), GateMetricsSnapshot::default());
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = GateMetrics::new();
        let clone = metrics.clone();
        clone.record_admitted();
        clone.record_admitted();
        metrics.record_duplicate();

        assert_eq!(metrics.admitted(), 2);
        assert_eq!(clone.duplicates_rejected(), 1);
    }

    #[test]
    fn test_reset() {
        let metrics = GateMetrics::new();
        metrics.record_permit();
        metrics.record_store_failure();
        metrics.record_attempt();
        metrics.reset();

        assert_eq!(metrics.snapshot(), GateMetricsSnapshot::default());
    }

    #[test]
    fn test_duplicate_rate() {
        let snapshot = GateMetricsSnapshot {
            admitted: 3,
            duplicates_rejected: 1,
            ..Default::default()
        };
        assert_eq!(snapshot.duplicate_rate(), 0.25);
        assert_eq!(GateMetricsSnapshot::default().duplicate_rate(), 0.0);
    }

    #[test]
    fn test_denial_rate_counts_missing_rules() {
        let snapshot = GateMetricsSnapshot {
            permits: 2,
            denials: 1,
            configuration_missing: 1,
            ..Default::default()
        };
        assert_eq!(snapshot.denial_rate(), 0.5);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = GateMetrics::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record_attempt();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.attempts_recorded(), 800);
    }
}

//! Periodic purge of expired records.
//!
//! Expired duplicate records and challenge windows are already ignored on
//! read, so sweeping only bounds memory for in-process stores. Redis stores
//! expire natively and report nothing to purge.

use crate::application::pipeline::ActionGate;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[cfg(feature = "async")]
use tokio::{sync::oneshot, task::JoinHandle, time::interval};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweeper.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub duplicates: usize,
    pub challenges: usize,
    pub tokens: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.duplicates + self.challenges + self.tokens
    }
}

/// Purges expired state from a gate's stores.
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    gate: Arc<ActionGate>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    /// Create a sweeper.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if the interval is zero.
    pub fn new(gate: Arc<ActionGate>, config: SweeperConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { gate, config })
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Run one sweep now.
    pub fn sweep_once(&self) -> SweepReport {
        let report = SweepReport {
            duplicates: self.gate.duplicates().purge_expired(),
            challenges: self.gate.challenges().purge_expired(),
            tokens: self.gate.challenges().purge_expired_tokens(),
        };
        if report.total() > 0 {
            debug!(
                duplicates = report.duplicates,
                challenges = report.challenges,
                tokens = report.tokens,
                "purged expired records"
            );
        }
        report
    }

    /// Sweep on the configured interval in a background task.
    ///
    /// The task runs until [`SweeperHandle::shutdown`] is called. Dropping the
    /// handle without shutting down leaves the task running.
    #[cfg(feature = "async")]
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval());
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once();
                    }
                    _ = &mut shutdown_rx => {
                        debug!("expiry sweeper stopping");
                        break;
                    }
                }
            }
        });

        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }
}

/// Error returned when the sweeper task does not stop cleanly.
#[cfg(feature = "async")]
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// The sweeper task panicked
    #[error("sweeper task panicked")]
    TaskPanicked,
    /// The sweeper task was cancelled by the runtime
    #[error("sweeper task was cancelled")]
    TaskCancelled,
}

/// Handle to a running [`ExpirySweeper`].
#[cfg(feature = "async")]
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

#[cfg(feature = "async")]
impl SweeperHandle {
    /// Stop the sweeper and wait for the task to finish.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown_tx.take() {
            // The task may already be gone; joining reports why
            let _ = tx.send(());
        }

        self.task.await.map_err(|e| {
            if e.is_panic() {
                ShutdownError::TaskPanicked
            } else {
                ShutdownError::TaskCancelled
            }
        })
    }

    /// Check if the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::ActionKind;
    use crate::domain::actor::UserId;
    use crate::infrastructure::config::GateConfig;
    use crate::infrastructure::mocks::MockClock;
    use std::time::Instant;

    fn gate(clock: &MockClock) -> Arc<ActionGate> {
        Arc::new(
            ActionGate::builder(GateConfig::default())
                .with_clock(Arc::new(clock.clone()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_zero_interval_rejected() {
        let clock = MockClock::new(Instant::now());
        let result = ExpirySweeper::new(gate(&clock), SweeperConfig { interval_secs: 0 });
        assert!(result.is_err());
    }

    #[test]
    fn test_sweep_once_purges_expired_only() {
        let clock = MockClock::new(Instant::now());
        let gate = gate(&clock);
        let user = UserId::from("1");

        let stale = gate.duplicates().fingerprint(&user, "answer.add").build();
        gate.duplicates().admit(&stale);
        gate.challenges().record_attempt(&user, ActionKind::Answer);

        clock.advance(Duration::from_secs(301));
        let fresh = gate.duplicates().fingerprint(&user, "answer.edit").build();
        gate.duplicates().admit(&fresh);

        let sweeper = ExpirySweeper::new(gate.clone(), SweeperConfig::default()).unwrap();
        let report = sweeper.sweep_once();

        assert_eq!(report.duplicates, 1);
        assert_eq!(report.challenges, 1);
        assert!(!gate.duplicates().admit(&fresh).is_admitted());
    }

    #[test]
    fn test_sweep_purges_expired_tokens() {
        let clock = MockClock::new(Instant::now());
        let captcha = Arc::new(crate::infrastructure::captcha::IssuedChallenges::new(
            Arc::new(clock.clone()),
            Duration::from_secs(60),
        ));
        let gate = Arc::new(
            ActionGate::builder(GateConfig::default())
                .with_clock(Arc::new(clock.clone()))
                .with_verifier(captcha.clone())
                .build()
                .unwrap(),
        );
        captcha.issue(&UserId::from("1"), ActionKind::Answer, "42");
        clock.advance(Duration::from_secs(61));

        let sweeper = ExpirySweeper::new(gate, SweeperConfig::default()).unwrap();
        assert_eq!(sweeper.sweep_once().tokens, 1);
        assert!(captcha.is_empty());
    }
}

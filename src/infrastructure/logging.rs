//! Subscriber setup for applications embedding the gate.
//!
//! The gate itself only emits `tracing` events: `debug!` for admissions and
//! decisions, `warn!` for store failures and missing rules. Libraries never
//! install a subscriber on their own; [`init_logging`] is a convenience for
//! binaries that want the configured format.
//!
//! The filter level can be overridden at runtime via the `RUST_LOG`
//! environment variable.

use serde::{Deserialize, Serialize};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Selects the output format for structured logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines for local development
    #[default]
    Human,
    /// Newline-delimited JSON for log aggregation
    Json,
}

/// The `[logging]` section of the gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Human,
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber described by this section.
    pub fn init(&self) -> Result<(), TryInitError> {
        init_logging(self.format, &self.level)
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
/// Returns an error if a global subscriber has already been set.
pub fn init_logging(format: LogFormat, level: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init(),
    }
}

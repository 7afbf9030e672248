//! Error types.
//!
//! [`GateError`] is the caller-visible taxonomy returned to action handlers.
//! [`StoreError`] never crosses an operation boundary: components resolve it
//! through their configured failure policy and log it. [`ConfigError`]
//! covers loading and validating configuration.

use crate::domain::action::{Action, ActionKind};
use crate::domain::fingerprint::Fingerprint;
use thiserror::Error;

/// A typed gating outcome that stops a request before its mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Rank and ownership are insufficient for the action
    #[error("rank does not meet the condition for `{action}`")]
    PermissionDenied { action: Action },

    /// The caller must solve a fresh challenge before retrying
    #[error("verification is required for `{kind}` actions")]
    ChallengeRequired { kind: ActionKind },

    /// The submitted token did not verify; the counter was not reset
    #[error("verification failed for `{kind}` actions")]
    ChallengeFailed { kind: ActionKind },

    /// The same logical request is already in flight.
    ///
    /// Also returned when the duplicate store is down under
    /// `FailurePolicy::FailClosed`; `GateMetrics::store_failures` tells the
    /// two apart.
    #[error("duplicate request {fingerprint} rejected")]
    DuplicateRejected { fingerprint: Fingerprint },

    /// No rank rule exists for the action; treated as a denial
    #[error("no permission rule configured for `{action}`")]
    ConfigurationMissing { action: Action },
}

impl GateError {
    /// Stable reason key a handler can map to a message or status code.
    pub fn reason(&self) -> &'static str {
        match self {
            GateError::PermissionDenied { .. } => "rank_fail_to_meet_the_condition",
            GateError::ChallengeRequired { .. } => "captcha_required",
            GateError::ChallengeFailed { .. } => "captcha_verification_failed",
            GateError::DuplicateRejected { .. } => "duplicate_request",
            GateError::ConfigurationMissing { .. } => "permission_rule_missing",
        }
    }

    /// Whether the rejection was caused by the user rather than by the
    /// deployment's configuration.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, GateError::ConfigurationMissing { .. })
    }
}

/// Failure of a backing store or verifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store answered with an error
    #[error("store error: {0}")]
    Backend(String),
}

#[cfg(feature = "redis-storage")]
impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

/// Error returned when loading or validating configuration fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration could not be rendered as TOML
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// The configuration parsed but violates a constraint
    #[error("invalid config: {0}")]
    Invalid(String),
}

//! Gate configuration loaded from TOML.
//!
//! ```toml
//! strict = true
//!
//! [permissions]
//! "answer.add" = { others = 1 }
//! "answer.edit" = { others = 100, owner = 1 }
//!
//! [challenge]
//! exemption = "admins_with_rank"
//! default = { threshold = 5, window_secs = 300 }
//!
//! [duplicate]
//! window_ms = 2000
//! on_store_error = "fail_open"
//! ```
//!
//! Every section and field is optional and falls back to its default.

use crate::application::challenge::{ChallengeConfig, ChallengeExemption};
use crate::application::circuit_breaker::CircuitBreakerConfig;
use crate::application::suppressor::SuppressorConfig;
use crate::application::sweeper::SweeperConfig;
use crate::domain::action::Action;
use crate::domain::rank::RankRules;
use crate::error::ConfigError;
use crate::infrastructure::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Complete configuration for an `ActionGate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Fail validation when a required permission rule is missing
    pub strict: bool,
    /// Actions that must have a permission rule
    pub required_actions: Vec<Action>,
    pub permissions: RankRules,
    pub challenge: ChallengeConfig,
    pub duplicate: SuppressorConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub sweeper: SweeperConfig,
    pub logging: LoggingConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            strict: false,
            required_actions: Action::ANSWER_HANDLER_ACTIONS.to_vec(),
            permissions: RankRules::default(),
            challenge: ChallengeConfig::default(),
            duplicate: SuppressorConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            sweeper: SweeperConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GateConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read, or
    /// `ConfigError::Parse` if it is not valid configuration.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Replace the permission rules.
    pub fn with_permissions(mut self, permissions: RankRules) -> Self {
        self.permissions = permissions;
        self
    }

    /// Check constraints that serde cannot express.
    ///
    /// Missing rules for required actions are an error in strict mode and a
    /// warning otherwise. At runtime a missing rule still denies non-admins.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.duplicate.validate()?;
        self.challenge.validate()?;
        self.sweeper.validate()?;
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be greater than zero".to_string(),
            ));
        }

        let mut missing = self.permissions.missing(&self.required_actions);
        let exemption_uses_rank = matches!(
            self.challenge.exemption,
            ChallengeExemption::AdminsOrRank | ChallengeExemption::AdminsWithRank
        );
        let exemption_action = &self.challenge.exemption_action;
        if exemption_uses_rank
            && self.permissions.rule(exemption_action).is_none()
            && !missing.contains(exemption_action)
        {
            missing.push(exemption_action.clone());
        }

        if !missing.is_empty() {
            let names = missing
                .iter()
                .map(Action::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if self.strict {
                return Err(ConfigError::Invalid(format!(
                    "missing permission rules: {names}"
                )));
            }
            warn!(missing = %names, "permission rules missing, these actions deny non-admins");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::circuit_breaker::FailurePolicy;
    use crate::domain::action::ActionKind;
    use crate::domain::rank::PermissionRule;
    use crate::infrastructure::logging::LogFormat;

    fn complete_rules() -> RankRules {
        Action::ANSWER_HANDLER_ACTIONS
            .iter()
            .map(|action| (action.clone(), PermissionRule::new(1)))
            .collect()
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = GateConfig::from_toml_str("").unwrap();
        assert_eq!(config, GateConfig::default());
        assert_eq!(config.duplicate.window_ms, 2000);
        assert_eq!(config.challenge.on_store_error, FailurePolicy::FailClosed);
    }

    #[test]
    fn test_full_toml() {
        let toml = r#"
            strict = true

            [permissions]
            "answer.add" = { others = 1 }
            "answer.edit" = { others = 100, owner = 1 }

            [challenge]
            exemption = "admins_or_rank"
            default = { threshold = 3, window_secs = 60 }

            [challenge.kinds.answer]
            threshold = 10
            window_secs = 3600

            [duplicate]
            window_ms = 5000
            on_store_error = "fail_closed"
            admins_bypass = true

            [logging]
            format = "json"
        "#;
        let config = GateConfig::from_toml_str(toml).unwrap();

        assert!(config.strict);
        assert_eq!(
            config.permissions.rule(&Action::AnswerEdit),
            Some(&PermissionRule::with_owner(100, 1))
        );
        assert_eq!(config.challenge.exemption, ChallengeExemption::AdminsOrRank);
        assert_eq!(config.challenge.limit(ActionKind::Answer).threshold, 10);
        assert_eq!(config.challenge.limit(ActionKind::Vote).threshold, 3);
        assert_eq!(config.duplicate.on_store_error, FailurePolicy::FailClosed);
        assert!(config.duplicate.admins_bypass);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_round_trip() {
        let config = GateConfig::default().with_permissions(complete_rules());
        let text = config.to_toml_string().unwrap();
        assert_eq!(GateConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = GateConfig::from_toml_str("[duplicate]\non_store_error = \"retry\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result =
            GateConfig::from_toml_str("[challenge.kinds.upload]\nthreshold = 1\nwindow_secs = 1");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_strict_mode_requires_rules() {
        let mut config = GateConfig {
            strict: true,
            ..GateConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("answer.accept"));

        config.permissions = complete_rules();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lenient_mode_only_warns() {
        assert!(GateConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rank_exemption_requires_its_rule() {
        let mut config = GateConfig {
            strict: true,
            permissions: complete_rules(),
            required_actions: Vec::new(),
            ..GateConfig::default()
        };
        config.challenge.exemption = ChallengeExemption::AdminsWithRank;
        config.challenge.exemption_action = Action::Custom("captcha.exempt".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("captcha.exempt"));
    }

    #[test]
    fn test_zero_windows_rejected() {
        let mut config = GateConfig::default();
        config.duplicate.window_ms = 0;
        assert!(config.validate().is_err());

        let mut config = GateConfig::default();
        config.challenge.default.window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = GateConfig::from_toml_file("/nonexistent/action-gate.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}

//! Rank-threshold permission evaluation.
//!
//! The evaluator is pure: a decision depends only on the immutable rule
//! table and the facts passed in by the caller. Admins and moderators
//! bypass every threshold, including actions that have no rule at all.

use crate::application::metrics::GateMetrics;
use crate::domain::action::Action;
use crate::domain::rank::{Decision, Rank, RankRules};
use crate::error::GateError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether an actor may perform an action.
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    rules: Arc<RankRules>,
    metrics: GateMetrics,
}

impl PermissionEvaluator {
    /// Create an evaluator over a rule table.
    pub fn new(rules: RankRules) -> Self {
        Self::with_metrics(Arc::new(rules), GateMetrics::new())
    }

    /// Create an evaluator that reports into shared metrics.
    pub fn with_metrics(rules: Arc<RankRules>, metrics: GateMetrics) -> Self {
        Self { rules, metrics }
    }

    /// Decide on a single action.
    ///
    /// # Errors
    /// Returns [`GateError::ConfigurationMissing`] when a non-admin asks for
    /// an action without a rule. Callers must treat that as a denial.
    pub fn evaluate(
        &self,
        rank: Rank,
        action: &Action,
        is_owner: bool,
        is_admin: bool,
    ) -> Result<Decision, GateError> {
        if is_admin {
            self.metrics.record_permit();
            return Ok(Decision::Permit);
        }

        let Some(rule) = self.rules.rule(action) else {
            self.metrics.record_configuration_missing();
            warn!(%action, rank, "no permission rule configured, denying");
            return Err(GateError::ConfigurationMissing {
                action: action.clone(),
            });
        };

        let decision = rule.decide(rank, is_owner);
        match decision {
            Decision::Permit => self.metrics.record_permit(),
            Decision::Deny => self.metrics.record_denial(),
        }
        debug!(%action, rank, is_owner, ?decision, "permission evaluated");
        Ok(decision)
    }

    /// Deny-by-default form of [`evaluate`](Self::evaluate).
    ///
    /// A missing rule yields `false`.
    pub fn permits(&self, rank: Rank, action: &Action, is_owner: bool, is_admin: bool) -> bool {
        self.evaluate(rank, action, is_owner, is_admin)
            .is_ok_and(|decision| decision.is_permit())
    }

    /// Evaluate several actions in one pass, preserving input order.
    pub fn evaluate_many(
        &self,
        rank: Rank,
        actions: &[Action],
        is_owner: bool,
        is_admin: bool,
    ) -> Vec<bool> {
        actions
            .iter()
            .map(|action| self.permits(rank, action, is_owner, is_admin))
            .collect()
    }

    /// Require a permit.
    ///
    /// # Errors
    /// [`GateError::PermissionDenied`] on a denial, or
    /// [`GateError::ConfigurationMissing`] when no rule exists.
    pub fn authorize(
        &self,
        rank: Rank,
        action: &Action,
        is_owner: bool,
        is_admin: bool,
    ) -> Result<(), GateError> {
        match self.evaluate(rank, action, is_owner, is_admin)? {
            Decision::Permit => Ok(()),
            Decision::Deny => Err(GateError::PermissionDenied {
                action: action.clone(),
            }),
        }
    }

    /// The rule table this evaluator reads.
    pub fn rules(&self) -> &RankRules {
        &self.rules
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }
}

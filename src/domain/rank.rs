//! Rank thresholds and permission decisions.
//!
//! Every permission-checked action has a [`PermissionRule`]: the minimum rank
//! needed to act on other users' objects, and optionally a lower minimum that
//! applies when the actor owns the target. Rules are grouped in an immutable
//! [`RankRules`] table loaded once at startup.

use crate::domain::action::Action;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reputation-derived rank. Never negative.
pub type Rank = u64;

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The actor may perform the action
    Permit,
    /// The actor may not perform the action
    Deny,
}

impl Decision {
    /// Check if this decision is Permit.
    pub fn is_permit(&self) -> bool {
        matches!(self, Decision::Permit)
    }

    /// Check if this decision is Deny.
    pub fn is_deny(&self) -> bool {
        matches!(self, Decision::Deny)
    }
}

/// Rank thresholds for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Minimum rank to act on objects owned by someone else
    pub others: Rank,
    /// Minimum rank to act on one's own objects, if it differs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Rank>,
}

impl PermissionRule {
    /// A rule with a single threshold for everyone.
    pub fn new(others: Rank) -> Self {
        Self {
            others,
            owner: None,
        }
    }

    /// A rule with a separate threshold for owners.
    pub fn with_owner(others: Rank, owner: Rank) -> Self {
        Self {
            others,
            owner: Some(owner),
        }
    }

    /// Decide for a non-admin actor.
    ///
    /// The owner threshold is only consulted when the actor owns the target
    /// and one is configured; otherwise the "others" threshold applies.
    pub fn decide(&self, rank: Rank, is_owner: bool) -> Decision {
        if is_owner {
            if let Some(owner) = self.owner {
                if rank >= owner {
                    return Decision::Permit;
                }
            }
        }

        if rank >= self.others {
            Decision::Permit
        } else {
            Decision::Deny
        }
    }
}

/// Immutable action-to-rule table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankRules {
    rules: BTreeMap<Action, PermissionRule>,
}

impl RankRules {
    /// Create an empty rule table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the rule for an action.
    pub fn with_rule(mut self, action: Action, rule: PermissionRule) -> Self {
        self.rules.insert(action, rule);
        self
    }

    /// Look up the rule for an action.
    pub fn rule(&self, action: &Action) -> Option<&PermissionRule> {
        self.rules.get(action)
    }

    /// List the actions from `required` that have no rule, in input order.
    pub fn missing(&self, required: &[Action]) -> Vec<Action> {
        required
            .iter()
            .filter(|action| !self.rules.contains_key(*action))
            .cloned()
            .collect()
    }

    /// Iterate over all configured rules.
    pub fn iter(&self) -> impl Iterator<Item = (&Action, &PermissionRule)> {
        self.rules.iter()
    }

    /// Get the number of configured rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if no rules are configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<(Action, PermissionRule)> for RankRules {
    fn from_iter<I: IntoIterator<Item = (Action, PermissionRule)>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        let rule = PermissionRule::new(100);
        assert_eq!(rule.decide(99, false), Decision::Deny);
        assert_eq!(rule.decide(100, false), Decision::Permit);
    }

    #[test]
    fn test_owner_threshold_only_applies_to_owner() {
        let rule = PermissionRule::with_owner(100, 30);
        assert_eq!(rule.decide(50, true), Decision::Permit);
        assert_eq!(rule.decide(50, false), Decision::Deny);
        assert_eq!(rule.decide(29, true), Decision::Deny);
    }

    #[test]
    fn test_owner_without_owner_threshold_uses_others() {
        let rule = PermissionRule::new(100);
        assert_eq!(rule.decide(50, true), Decision::Deny);
        assert_eq!(rule.decide(100, true), Decision::Permit);
    }

    #[test]
    fn test_zero_rank() {
        assert_eq!(PermissionRule::new(1).decide(0, false), Decision::Deny);
        assert_eq!(PermissionRule::new(0).decide(0, false), Decision::Permit);
    }

    #[test]
    fn test_missing_preserves_order() {
        let rules = RankRules::new().with_rule(Action::AnswerEdit, PermissionRule::new(1));
        let missing = rules.missing(&[Action::AnswerDelete, Action::AnswerEdit, Action::AnswerAdd]);
        assert_eq!(missing, vec![Action::AnswerDelete, Action::AnswerAdd]);
    }

    #[test]
    fn test_rules_deserialize_from_dotted_keys() {
        let rules: RankRules = serde_json::from_str(
            r#"{"answer.edit": {"others": 100, "owner": 1}, "wiki.edit": {"others": 5}}"#,
        )
        .unwrap();

        assert_eq!(
            rules.rule(&Action::AnswerEdit),
            Some(&PermissionRule::with_owner(100, 1))
        );
        assert_eq!(
            rules.rule(&Action::Custom("wiki.edit".to_string())),
            Some(&PermissionRule::new(5))
        );
    }
}

//! The acting user, as seen by the gating layer.

use crate::domain::rank::Rank;
use std::fmt;

/// Opaque identifier of a forum user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    /// Wrap a raw user identifier.
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        UserId(id)
    }
}

/// Facts about the acting user, looked up once per request by the handler.
///
/// Rank and the admin/moderator flag come from external collaborators and
/// are read-only here. Ownership depends on the target object, so it is
/// passed per call instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Who is acting
    pub user_id: UserId,
    /// Reputation-derived rank
    pub rank: Rank,
    /// Admin or moderator role
    pub is_admin: bool,
}

impl Actor {
    /// A regular member with the given rank.
    pub fn member(user_id: impl Into<UserId>, rank: Rank) -> Self {
        Self {
            user_id: user_id.into(),
            rank,
            is_admin: false,
        }
    }

    /// An admin or moderator.
    pub fn admin(user_id: impl Into<UserId>, rank: Rank) -> Self {
        Self {
            user_id: user_id.into(),
            rank,
            is_admin: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_display() {
        let id = UserId::from("1024");
        assert_eq!(id.to_string(), "1024");
        assert_eq!(id.as_str(), "1024");
    }

    #[test]
    fn test_actor_constructors() {
        let member = Actor::member("alice", 12);
        assert!(!member.is_admin);
        assert_eq!(member.rank, 12);

        let admin = Actor::admin("root", 0);
        assert!(admin.is_admin);
        assert_eq!(admin.user_id, UserId::new("root"));
    }
}

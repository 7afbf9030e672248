//! Action identities.
//!
//! Two separate vocabularies live here:
//! - [`Action`] names a permission rule (`answer.edit`, `link.url_limit`, ...)
//! - [`ActionKind`] names a captcha category (`answer`, `edit`, `delete`, ...)
//!
//! Several permission actions share one captcha kind: editing a question and
//! editing an answer both escalate under [`ActionKind::Edit`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A permission-checked forum action.
///
/// Well-known actions have dedicated variants so handlers never build rule
/// names from strings. Deployments can add their own rules through
/// [`Action::Custom`]; parsing never fails, unknown names become custom actions.
///
/// Equality, hashing and ordering follow the rule name, so
/// `Action::Custom("answer.add".into())` and [`Action::AnswerAdd`] are the
/// same rule.
#[derive(Debug, Clone)]
pub enum Action {
    QuestionAdd,
    QuestionEdit,
    QuestionEditWithoutReview,
    QuestionDelete,
    QuestionUnDelete,
    QuestionClose,
    QuestionReopen,
    QuestionVoteUp,
    QuestionVoteDown,
    QuestionPin,
    QuestionHide,
    AnswerAdd,
    AnswerEdit,
    AnswerEditWithoutReview,
    AnswerDelete,
    AnswerUnDelete,
    AnswerAccept,
    AnswerVoteUp,
    AnswerVoteDown,
    AnswerInviteSomeoneToAnswer,
    CommentAdd,
    CommentEdit,
    CommentDelete,
    CommentVoteUp,
    ReportAdd,
    TagAdd,
    TagEdit,
    TagDelete,
    TagSynonym,
    LinkUrlLimit,
    Custom(String),
}

impl Action {
    /// Actions the answer handlers check. Used as the default set of rules
    /// a configuration is expected to define.
    pub const ANSWER_HANDLER_ACTIONS: &'static [Action] = &[
        Action::AnswerAdd,
        Action::AnswerEdit,
        Action::AnswerEditWithoutReview,
        Action::AnswerDelete,
        Action::AnswerUnDelete,
        Action::AnswerAccept,
        Action::LinkUrlLimit,
    ];

    /// The dotted rule name used in configuration.
    pub fn as_str(&self) -> &str {
        match self {
            Action::QuestionAdd => "question.add",
            Action::QuestionEdit => "question.edit",
            Action::QuestionEditWithoutReview => "question.edit_without_review",
            Action::QuestionDelete => "question.delete",
            Action::QuestionUnDelete => "question.undelete",
            Action::QuestionClose => "question.close",
            Action::QuestionReopen => "question.reopen",
            Action::QuestionVoteUp => "question.vote_up",
            Action::QuestionVoteDown => "question.vote_down",
            Action::QuestionPin => "question.pin",
            Action::QuestionHide => "question.hide",
            Action::AnswerAdd => "answer.add",
            Action::AnswerEdit => "answer.edit",
            Action::AnswerEditWithoutReview => "answer.edit_without_review",
            Action::AnswerDelete => "answer.delete",
            Action::AnswerUnDelete => "answer.undelete",
            Action::AnswerAccept => "answer.accept",
            Action::AnswerVoteUp => "answer.vote_up",
            Action::AnswerVoteDown => "answer.vote_down",
            Action::AnswerInviteSomeoneToAnswer => "answer.invite_someone_to_answer",
            Action::CommentAdd => "comment.add",
            Action::CommentEdit => "comment.edit",
            Action::CommentDelete => "comment.delete",
            Action::CommentVoteUp => "comment.vote_up",
            Action::ReportAdd => "report.add",
            Action::TagAdd => "tag.add",
            Action::TagEdit => "tag.edit",
            Action::TagDelete => "tag.delete",
            Action::TagSynonym => "tag.synonym",
            Action::LinkUrlLimit => "link.url_limit",
            Action::Custom(name) => name,
        }
    }
}

impl FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "question.add" => Action::QuestionAdd,
            "question.edit" => Action::QuestionEdit,
            "question.edit_without_review" => Action::QuestionEditWithoutReview,
            "question.delete" => Action::QuestionDelete,
            "question.undelete" => Action::QuestionUnDelete,
            "question.close" => Action::QuestionClose,
            "question.reopen" => Action::QuestionReopen,
            "question.vote_up" => Action::QuestionVoteUp,
            "question.vote_down" => Action::QuestionVoteDown,
            "question.pin" => Action::QuestionPin,
            "question.hide" => Action::QuestionHide,
            "answer.add" => Action::AnswerAdd,
            "answer.edit" => Action::AnswerEdit,
            "answer.edit_without_review" => Action::AnswerEditWithoutReview,
            "answer.delete" => Action::AnswerDelete,
            "answer.undelete" => Action::AnswerUnDelete,
            "answer.accept" => Action::AnswerAccept,
            "answer.vote_up" => Action::AnswerVoteUp,
            "answer.vote_down" => Action::AnswerVoteDown,
            "answer.invite_someone_to_answer" => Action::AnswerInviteSomeoneToAnswer,
            "comment.add" => Action::CommentAdd,
            "comment.edit" => Action::CommentEdit,
            "comment.delete" => Action::CommentDelete,
            "comment.vote_up" => Action::CommentVoteUp,
            "report.add" => Action::ReportAdd,
            "tag.add" => Action::TagAdd,
            "tag.edit" => Action::TagEdit,
            "tag.delete" => Action::TagDelete,
            "tag.synonym" => Action::TagSynonym,
            "link.url_limit" => Action::LinkUrlLimit,
            other => Action::Custom(other.to_string()),
        };
        Ok(action)
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Action {}

impl Hash for Action {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for Action {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Action {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(action) => action,
            Err(never) => match never {},
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Action::from(name.as_str()))
    }
}

/// Captcha action category.
///
/// Challenge counters are tracked per `(user, kind)`, so an answer flood
/// escalates the `answer` kind without affecting the user's votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Email,
    Password,
    EditUserInfo,
    Question,
    Answer,
    Comment,
    Edit,
    InvitationAnswer,
    Search,
    Report,
    Delete,
    Vote,
}

impl ActionKind {
    /// Every kind, in declaration order.
    pub const ALL: [ActionKind; 12] = [
        ActionKind::Email,
        ActionKind::Password,
        ActionKind::EditUserInfo,
        ActionKind::Question,
        ActionKind::Answer,
        ActionKind::Comment,
        ActionKind::Edit,
        ActionKind::InvitationAnswer,
        ActionKind::Search,
        ActionKind::Report,
        ActionKind::Delete,
        ActionKind::Vote,
    ];

    /// Name used in configuration and store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Email => "email",
            ActionKind::Password => "password",
            ActionKind::EditUserInfo => "edit_userinfo",
            ActionKind::Question => "question",
            ActionKind::Answer => "answer",
            ActionKind::Comment => "comment",
            ActionKind::Edit => "edit",
            ActionKind::InvitationAnswer => "invitation_answer",
            ActionKind::Search => "search",
            ActionKind::Report => "report",
            ActionKind::Delete => "delete",
            ActionKind::Vote => "vote",
        }
    }
}

/// Error returned when parsing an unknown captcha action kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown captcha action kind `{0}`")]
pub struct UnknownActionKind(pub String);

impl FromStr for ActionKind {
    type Err = UnknownActionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownActionKind(s.to_string()))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_round_trip() {
        for action in Action::ANSWER_HANDLER_ACTIONS {
            assert_eq!(&Action::from(action.as_str()), action);
        }
    }

    #[test]
    fn test_unknown_action_becomes_custom() {
        let action = Action::from("wiki.edit");
        assert_eq!(action, Action::Custom("wiki.edit".to_string()));
        assert_eq!(action.to_string(), "wiki.edit");
    }

    #[test]
    fn test_custom_with_known_name_is_same_rule() {
        use std::collections::HashSet;

        let custom = Action::Custom("answer.add".to_string());
        assert_eq!(custom, Action::AnswerAdd);
        assert_eq!(custom.cmp(&Action::AnswerAdd), Ordering::Equal);

        let set: HashSet<Action> = [Action::AnswerAdd, custom].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_ne!(Action::Custom("answer.adds".to_string()), Action::AnswerAdd);
    }

    #[test]
    fn test_action_kind_parse() {
        assert_eq!("answer".parse::<ActionKind>(), Ok(ActionKind::Answer));
        assert_eq!(
            "edit_userinfo".parse::<ActionKind>(),
            Ok(ActionKind::EditUserInfo)
        );
        assert!("upload".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_action_kind_names_are_unique() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>(), Ok(kind));
        }
    }
}

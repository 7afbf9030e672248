//! # action-gate
//!
//! Gating for forum write actions: rank permissions, captcha escalation and
//! duplicate-request suppression.
//!
//! Every mutating forum operation (adding, editing, deleting or accepting an
//! answer, and so on) passes three checks before the mutation runs:
//!
//! - **Permission evaluator**: the actor's rank must meet the action's
//!   threshold. Owners may have a lower threshold, and admins or moderators
//!   pass every threshold.
//! - **Challenge gate**: once a user's recent attempts for an action kind
//!   reach a threshold, the next attempt needs a passed captcha. Only a
//!   passed captcha resets the counter.
//! - **Duplicate suppressor**: a second submission of the same logical
//!   request is rejected while the first is in flight. A failed request
//!   releases its fingerprint so the user can retry at once.
//!
//! All three are shared, internally synchronized state, safe to call from
//! many request workers at once.
//!
//! ## Quick Start
//!
//! ```rust
//! use action_gate::{
//!     Action, ActionError, ActionGate, ActionKind, Actor, GateConfig, GateError, GateRequest,
//!     PermissionRule, RankRules,
//! };
//!
//! let rules = RankRules::new()
//!     .with_rule(Action::AnswerAdd, PermissionRule::new(1))
//!     .with_rule(Action::AnswerEdit, PermissionRule::with_owner(100, 1));
//! let gate = ActionGate::builder(GateConfig::default().with_permissions(rules))
//!     .build()
//!     .unwrap();
//!
//! let actor = Actor::member("42", 10);
//! let fingerprint = gate
//!     .duplicates()
//!     .fingerprint(&actor.user_id, "answer.add")
//!     .field("question_id", "10010")
//!     .field("content", "Have you tried turning it off and on again?")
//!     .build();
//!
//! let request = GateRequest::new(&actor, Action::AnswerAdd)
//!     .challenge(ActionKind::Answer)
//!     .fingerprint(fingerprint);
//! let answer_id: Result<u64, ActionError<std::io::Error>> = gate.run(request, || Ok(7));
//! assert_eq!(answer_id.unwrap(), 7);
//!
//! // The same submission again is rejected while the first record is live
//! let request = GateRequest::new(&actor, Action::AnswerAdd).fingerprint(fingerprint);
//! let again: Result<u64, ActionError<std::io::Error>> = gate.run(request, || Ok(8));
//! assert!(matches!(
//!     again.unwrap_err().gate(),
//!     Some(GateError::DuplicateRejected { .. })
//! ));
//! ```
//!
//! ## Pipeline order
//!
//! [`ActionGate::run`] always runs the checks in this order:
//!
//! ```text
//! admit fingerprint -> authorize -> check challenge -> mutate
//!     -> record attempt -> release fingerprint on failure
//! ```
//!
//! A gate rejection never runs the mutation and never records an attempt.
//! The mutation's error is returned as [`ActionError::Action`] after the
//! attempt is recorded and the fingerprint released. Handlers that verify
//! the captcha before the ownership check call
//! [`GateRequest::challenge_first`].
//!
//! ## Admin asymmetry
//!
//! The admin flag passes every rank and ownership threshold, including
//! actions without a configured rule. It does **not** pass the duplicate
//! suppressor unless `duplicate.admins_bypass` is set.
//!
//! ## Store failures
//!
//! Stores are ports ([`DuplicateStore`], [`ChallengeStore`]) with in-process
//! DashMap and Redis implementations. A store error never reaches the
//! caller. It is logged at `warn`, counted in
//! [`GateMetrics::store_failures`], and resolved by the component's
//! [`FailurePolicy`]:
//!
//! | Component | Default | Meaning |
//! |-----------|---------|---------|
//! | Duplicate suppressor | `fail_open` | admit the request |
//! | Challenge gate | `fail_closed` | require a captcha |
//!
//! A [`CircuitBreaker`] per store stops calling a store after repeated
//! failures and probes it again after a recovery timeout.
//!
//! ## Configuration
//!
//! [`GateConfig`] is loaded from TOML:
//!
//! ```toml
//! strict = true
//!
//! [permissions]
//! "answer.add" = { others = 1 }
//! "answer.edit" = { others = 100, owner = 1 }
//! "link.url_limit" = { others = 500 }
//!
//! [challenge]
//! exemption = "admins_with_rank"
//! exemption_action = "link.url_limit"
//! default = { threshold = 5, window_secs = 300 }
//!
//! [challenge.kinds.answer]
//! threshold = 10
//! window_secs = 3600
//!
//! [duplicate]
//! window_ms = 2000
//! excluded_fields = ["request_id", "timestamp"]
//! on_store_error = "fail_open"
//! admins_bypass = false
//!
//! [logging]
//! format = "json"
//! level = "info"
//! ```
//!
//! ## Feature flags
//!
//! - `async`: [`ExpirySweeper`] background purge task (tokio)
//! - `redis-storage`: [`RedisStorage`] shared across instances
//! - `test-helpers`: `MockClock`, `MockCaptureLayer` and `FailingStore`

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

pub mod error;

// Re-export commonly used types for convenience
pub use domain::{
    action::{Action, ActionKind, UnknownActionKind},
    actor::{Actor, UserId},
    challenge::{ChallengeKey, ChallengeLevel, ChallengeLimit, ChallengeToken, Verification},
    fingerprint::{Fingerprint, FingerprintBuilder},
    rank::{Decision, PermissionRule, Rank, RankRules},
};

pub use application::{
    challenge::{ChallengeConfig, ChallengeExemption, ChallengeGate},
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, FailurePolicy},
    metrics::{GateMetrics, GateMetricsSnapshot},
    permission::PermissionEvaluator,
    pipeline::{ActionError, ActionGate, ChallengeOrder, GateRequest},
    ports::{CaptchaVerifier, ChallengeStore, Clock, DuplicateStore},
    suppressor::{Admission, AdmissionGuard, DuplicateSuppressor, SuppressorConfig},
    sweeper::{ExpirySweeper, SweepReport, SweeperConfig},
};

#[cfg(feature = "async")]
pub use application::sweeper::{ShutdownError, SweeperHandle};

pub use error::{ConfigError, GateError, StoreError};

pub use infrastructure::{
    builder::ActionGateBuilder,
    captcha::IssuedChallenges,
    clock::SystemClock,
    config::GateConfig,
    logging::{init_logging, LogFormat, LoggingConfig},
    storage::{DuplicateRecord, InMemoryChallengeStore, InMemoryDuplicateStore, ShardedStorage},
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_storage::{RedisStorage, RedisStorageConfig};

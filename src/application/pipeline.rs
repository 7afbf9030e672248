//! The composed write-action pipeline.
//!
//! [`ActionGate::run`] drives one request through the three mechanisms in a
//! fixed order:
//!
//! 1. admit the fingerprint (duplicates are rejected)
//! 2. authorize rank, ownership and admin facts
//! 3. check the challenge for the action kind
//! 4. run the mutation
//! 5. record the attempt
//! 6. release the fingerprint if any step failed
//!
//! Handlers that need a different order can still call the components
//! directly through [`ActionGate::permissions`], [`ActionGate::challenges`]
//! and [`ActionGate::duplicates`].

use crate::application::challenge::{ChallengeExemption, ChallengeGate};
use crate::application::metrics::GateMetrics;
use crate::application::permission::PermissionEvaluator;
use crate::application::suppressor::DuplicateSuppressor;
use crate::domain::action::{Action, ActionKind};
use crate::domain::actor::Actor;
use crate::domain::challenge::ChallengeToken;
use crate::domain::fingerprint::Fingerprint;
use crate::error::GateError;
use thiserror::Error;
use tracing::debug;

/// Where the challenge check sits relative to authorization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChallengeOrder {
    #[default]
    AfterPermission,
    /// Verify before authorizing, as destructive handlers do
    BeforePermission,
}

/// One write request as seen by the gate.
#[derive(Debug, Clone)]
pub struct GateRequest<'a> {
    actor: &'a Actor,
    action: Action,
    is_owner: bool,
    challenge: Option<ActionKind>,
    token: Option<&'a ChallengeToken>,
    fingerprint: Option<Fingerprint>,
    order: ChallengeOrder,
}

impl<'a> GateRequest<'a> {
    /// A request with no ownership, challenge or duplicate check.
    pub fn new(actor: &'a Actor, action: Action) -> Self {
        Self {
            actor,
            action,
            is_owner: false,
            challenge: None,
            token: None,
            fingerprint: None,
            order: ChallengeOrder::default(),
        }
    }

    /// Whether the actor owns the target object.
    pub fn owner(mut self, is_owner: bool) -> Self {
        self.is_owner = is_owner;
        self
    }

    /// Subject the request to the challenge for `kind`.
    pub fn challenge(mut self, kind: ActionKind) -> Self {
        self.challenge = Some(kind);
        self
    }

    /// Captcha answer submitted with the request, if any.
    pub fn token(mut self, token: Option<&'a ChallengeToken>) -> Self {
        self.token = token;
        self
    }

    /// Suppress duplicates of this fingerprint.
    pub fn fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Check the challenge before authorizing.
    pub fn challenge_first(mut self) -> Self {
        self.order = ChallengeOrder::BeforePermission;
        self
    }
}

/// Error returned by [`ActionGate::run`].
#[derive(Debug, Error)]
pub enum ActionError<E> {
    /// The gate stopped the request before the mutation ran
    #[error(transparent)]
    Gate(#[from] GateError),
    /// The mutation itself failed
    #[error("action failed: {0}")]
    Action(E),
}

impl<E> ActionError<E> {
    /// The gate rejection, if the mutation never ran.
    pub fn gate(&self) -> Option<&GateError> {
        match self {
            ActionError::Gate(e) => Some(e),
            ActionError::Action(_) => None,
        }
    }
}

/// Permission evaluator, challenge gate and duplicate suppressor wired
/// together with shared metrics.
#[derive(Debug)]
pub struct ActionGate {
    permissions: PermissionEvaluator,
    challenges: ChallengeGate,
    duplicates: DuplicateSuppressor,
    metrics: GateMetrics,
}

impl ActionGate {
    /// Compose a gate from its parts, sharing `metrics` between them.
    pub fn new(
        permissions: PermissionEvaluator,
        challenges: ChallengeGate,
        duplicates: DuplicateSuppressor,
        metrics: GateMetrics,
    ) -> Self {
        Self {
            permissions,
            challenges,
            duplicates,
            metrics,
        }
    }

    pub fn permissions(&self) -> &PermissionEvaluator {
        &self.permissions
    }

    pub fn challenges(&self) -> &ChallengeGate {
        &self.challenges
    }

    pub fn duplicates(&self) -> &DuplicateSuppressor {
        &self.duplicates
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    /// Check whether `actor` skips the challenge under the configured
    /// exemption policy.
    pub fn is_challenge_exempt(&self, actor: &Actor) -> bool {
        let config = self.challenges.config();
        let rank_exempt = match config.exemption {
            ChallengeExemption::AdminsOrRank | ChallengeExemption::AdminsWithRank => self
                .permissions
                .rules()
                .rule(&config.exemption_action)
                .is_some_and(|rule| rule.decide(actor.rank, false).is_permit()),
            ChallengeExemption::None | ChallengeExemption::Admins => false,
        };
        self.challenges.is_exempt(actor.is_admin, rank_exempt)
    }

    /// Gate `mutation` behind the duplicate, permission and challenge checks.
    ///
    /// The attempt is recorded once the mutation returns, whatever its
    /// outcome. A gate rejection records nothing. The fingerprint is released
    /// unless the mutation succeeds.
    ///
    /// # Errors
    /// [`ActionError::Gate`] if a check rejected the request, or
    /// [`ActionError::Action`] with the mutation's own error.
    pub fn run<T, E, F>(&self, request: GateRequest<'_>, mutation: F) -> Result<T, ActionError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let actor = request.actor;

        let bypass_duplicates = actor.is_admin && self.duplicates.config().admins_bypass;
        let guard = match request.fingerprint {
            Some(fingerprint) if !bypass_duplicates => Some(self.duplicates.guard(fingerprint)?),
            _ => None,
        };

        let challenge = request
            .challenge
            .filter(|_| !self.is_challenge_exempt(actor));

        if request.order == ChallengeOrder::BeforePermission {
            self.check_challenge(actor, challenge, request.token)?;
        }
        self.permissions
            .authorize(actor.rank, &request.action, request.is_owner, actor.is_admin)?;
        if request.order == ChallengeOrder::AfterPermission {
            self.check_challenge(actor, challenge, request.token)?;
        }

        let outcome = mutation();

        if let Some(kind) = challenge {
            self.challenges.record_attempt(&actor.user_id, kind);
        }

        match outcome {
            Ok(value) => {
                if let Some(guard) = guard {
                    guard.complete();
                }
                debug!(user = %actor.user_id, action = %request.action, "action completed");
                Ok(value)
            }
            Err(e) => Err(ActionError::Action(e)),
        }
    }

    fn check_challenge(
        &self,
        actor: &Actor,
        challenge: Option<ActionKind>,
        token: Option<&ChallengeToken>,
    ) -> Result<(), GateError> {
        match challenge {
            Some(kind) => self.challenges.check(&actor.user_id, kind, token),
            None => Ok(()),
        }
    }
}

//! Domain layer - pure business logic with no I/O.
//!
//! This layer contains the core concepts and invariants of the gating layer:
//! - Actors, actions and captcha action kinds
//! - Rank rules and permission decisions
//! - Challenge state and escalation levels
//! - Request fingerprints for duplicate suppression
//!
//! All types in this layer are pure and easily testable.

pub mod action;
pub mod actor;
pub mod challenge;
pub mod fingerprint;
pub mod rank;

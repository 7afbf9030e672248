//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages runtime state:
//! - Permission evaluator (rank decisions)
//! - Challenge gate (captcha escalation)
//! - Duplicate suppressor (in-flight request admission)
//! - Action gate (the composed pipeline)
//! - Expiry sweeper (periodic purge)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod challenge;
pub mod circuit_breaker;
pub mod metrics;
pub mod permission;
pub mod pipeline;
pub mod ports;
pub mod suppressor;
pub mod sweeper;

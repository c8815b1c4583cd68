//! Domain errors
//!
//! Pure domain errors with no infrastructure dependencies

use thiserror::Error;

use crate::mission::MissionStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid status transition for mission run {mission_run_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        mission_run_id: String,
        from: MissionStatus,
        to: MissionStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

//! Error types for mission scheduling

use flotilla_core::{AreaId, MissionRunId, RobotId};
use flotilla_domain::DomainError;
use thiserror::Error;

use crate::controller::ControllerError;

/// Subscription receive failures
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum BusError {
    /// The subscriber fell behind and the oldest events were overwritten
    #[error("Subscriber lagged, {0} events dropped")]
    Lagged(u64),

    /// Every publisher is gone
    #[error("Event bus closed")]
    Closed,
}

/// Mission store and directory errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Record with the same id already exists
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// The requested status change is not allowed
    #[error(transparent)]
    InvalidTransition(#[from] DomainError),

    /// Backing storage could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Faults raised by the mission scheduler and the event coordinator
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// Robot is not in the robot directory
    #[error("Robot not found: {0}")]
    RobotNotFound(RobotId),

    /// No mission run matched
    #[error("Mission run not found: {0}")]
    MissionRunNotFound(String),

    /// Area is not in the area directory
    #[error("Area not found: {0}")]
    AreaNotFound(AreaId),

    /// The robot controller rejected a command
    #[error("Mission execution failed (status {status_code}): {message}")]
    MissionExecution {
        /// Controller status code
        status_code: u16,
        /// Controller message
        message: String,
    },

    /// No safe position could be used for the area
    #[error("Safe zone unavailable in area {area_id}: {reason}")]
    SafeZone {
        /// Area that was searched
        area_id: AreaId,
        /// What went wrong
        reason: String,
    },

    /// Mission store or directory failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Domain rule violated
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The coordinator is already subscribed
    #[error("Event coordinator already running")]
    AlreadyRunning,
}

impl SchedulingError {
    /// Controller answered 409: the robot is not in a state where the
    /// command applies (e.g. stop while idle).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SchedulingError::MissionExecution { status_code, .. }
                if *status_code == ControllerError::STATUS_CONFLICT
        )
    }

    pub(crate) fn mission_run_not_found(id: &MissionRunId) -> Self {
        SchedulingError::MissionRunNotFound(id.to_string())
    }
}

impl From<ControllerError> for SchedulingError {
    fn from(err: ControllerError) -> Self {
        SchedulingError::MissionExecution {
            status_code: err.status_code,
            message: err.message,
        }
    }
}

/// Result type alias for scheduling operations
pub type Result<T> = std::result::Result<T, SchedulingError>;

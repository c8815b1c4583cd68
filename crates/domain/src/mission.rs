//! Mission run lifecycle
//!
//! A mission run is one scheduled execution of a mission on one robot. Its
//! status only moves along the transition table in
//! [`MissionStatus::can_transition_to`], and every move is appended to a
//! BLAKE3 hash-chained history so the audit trail can be verified later.

use flotilla_core::{AreaId, MissionRunId, RobotId};
use serde::{Deserialize, Serialize};

use crate::area::Position;
use crate::error::{DomainError, Result};

/// Mission run lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MissionStatus {
    /// Queued, waiting for the robot
    Pending,
    /// Start command accepted by the robot controller
    InProgress,
    /// Paused by the controller
    Paused,
    /// Completed successfully
    Completed,
    /// Completed with some tasks failing
    PartiallyCompleted,
    /// Failed to start or failed during execution
    Failed,
    /// Stopped before completion
    Aborted,
    /// Withdrawn before it started
    Cancelled,
}

impl MissionStatus {
    pub const ALL: [MissionStatus; 8] = [
        MissionStatus::Pending,
        MissionStatus::InProgress,
        MissionStatus::Paused,
        MissionStatus::Completed,
        MissionStatus::PartiallyCompleted,
        MissionStatus::Failed,
        MissionStatus::Aborted,
        MissionStatus::Cancelled,
    ];

    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionStatus::Completed
                | MissionStatus::PartiallyCompleted
                | MissionStatus::Failed
                | MissionStatus::Aborted
                | MissionStatus::Cancelled
        )
    }

    /// Check if the run is executing or paused mid-execution
    pub fn is_ongoing(&self) -> bool {
        matches!(self, MissionStatus::InProgress | MissionStatus::Paused)
    }

    /// Check if transition to new state is valid
    pub fn can_transition_to(&self, new_status: MissionStatus) -> bool {
        use MissionStatus::*;
        match (self, new_status) {
            (Pending, InProgress) | (Pending, Cancelled) | (Pending, Failed) => true,
            (InProgress, Paused)
            | (InProgress, Completed)
            | (InProgress, PartiallyCompleted)
            | (InProgress, Failed)
            | (InProgress, Aborted)
            | (InProgress, Cancelled) => true,
            (Paused, InProgress) | (Paused, Failed) | (Paused, Aborted) | (Paused, Cancelled) => {
                true
            }
            // Terminal states cannot transition
            _ => false,
        }
    }
}

/// Mission run priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MissionRunPriority {
    /// Regular queued work
    #[default]
    Normal,
    /// Emergency work; the only priority dispatched from a frozen queue
    Emergency,
}

/// Mission run with attested status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionRun {
    /// Unique mission run identifier
    pub id: MissionRunId,

    /// Human-readable name
    pub name: String,

    /// Robot executing this run
    pub robot_id: RobotId,

    /// Area the run takes place in
    pub area_id: Option<AreaId>,

    /// Current status
    pub status: MissionStatus,

    /// Dispatch priority
    pub priority: MissionRunPriority,

    /// Queue ordering key (Unix epoch milliseconds)
    pub desired_start_time: u64,

    /// Where the robot should drive, for runs that only move the robot
    pub destination: Option<Position>,

    /// When the run went in progress
    pub start_time: Option<u64>,

    /// When the run reached a terminal status
    pub end_time: Option<u64>,

    /// Why the run is in its current status, when known
    pub status_reason: Option<String>,

    /// Status transition history
    pub transitions: Vec<StatusTransition>,
}

impl MissionRun {
    /// Create a new pending run with normal priority
    pub fn new(
        id: MissionRunId,
        name: impl Into<String>,
        robot_id: RobotId,
        desired_start_time: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            robot_id,
            area_id: None,
            status: MissionStatus::Pending,
            priority: MissionRunPriority::Normal,
            desired_start_time,
            destination: None,
            start_time: None,
            end_time: None,
            status_reason: None,
            transitions: Vec::new(),
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: MissionRunPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the area
    pub fn with_area(mut self, area_id: AreaId) -> Self {
        self.area_id = Some(area_id);
        self
    }

    /// Set the destination
    pub fn with_destination(mut self, destination: Position) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == MissionStatus::Pending
    }

    pub fn is_emergency(&self) -> bool {
        self.priority == MissionRunPriority::Emergency
    }

    /// Transition to a new status
    pub fn transition(
        &mut self,
        new_status: MissionStatus,
        timestamp: u64,
        reason: Option<String>,
    ) -> Result<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidTransition {
                mission_run_id: self.id.to_string(),
                from: self.status,
                to: new_status,
            });
        }

        let prev_hash = self
            .transitions
            .last()
            .map(|t| t.hash.clone())
            .unwrap_or_else(|| vec![0u8; 32]);

        let transition = StatusTransition::new(
            self.id.clone(),
            self.status,
            new_status,
            timestamp,
            reason.clone(),
            prev_hash,
        );

        self.status = new_status;
        self.status_reason = reason;
        self.transitions.push(transition);

        if new_status == MissionStatus::InProgress && self.start_time.is_none() {
            self.start_time = Some(timestamp);
        }
        if new_status.is_terminal() {
            self.end_time = Some(timestamp);
        }

        Ok(())
    }

    /// Get the last transition
    pub fn last_transition(&self) -> Option<&StatusTransition> {
        self.transitions.last()
    }

    /// Verify every transition hash and the links between them
    pub fn verify_transitions(&self) -> bool {
        let mut expected_prev = vec![0u8; 32];
        for transition in &self.transitions {
            if transition.prev_hash != expected_prev || !transition.verify_hash() {
                return false;
            }
            expected_prev = transition.hash.clone();
        }
        true
    }
}

/// Status transition with hash link to its predecessor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    /// Mission run this transition belongs to
    pub mission_run_id: MissionRunId,

    /// Previous status
    pub from_status: MissionStatus,

    /// New status
    pub to_status: MissionStatus,

    /// Transition timestamp (Unix epoch milliseconds)
    pub timestamp: u64,

    /// Reason recorded with the transition
    pub reason: Option<String>,

    /// BLAKE3 hash of previous transition
    pub prev_hash: Vec<u8>,

    /// BLAKE3 hash of this transition
    pub hash: Vec<u8>,
}

impl StatusTransition {
    /// Create a new transition
    pub fn new(
        mission_run_id: MissionRunId,
        from_status: MissionStatus,
        to_status: MissionStatus,
        timestamp: u64,
        reason: Option<String>,
        prev_hash: Vec<u8>,
    ) -> Self {
        let mut transition = Self {
            mission_run_id,
            from_status,
            to_status,
            timestamp,
            reason,
            prev_hash,
            hash: Vec::new(),
        };

        transition.hash = transition.compute_hash();
        transition
    }

    /// Compute BLAKE3 hash of this transition
    pub fn compute_hash(&self) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.mission_run_id.as_str().as_bytes());
        hasher.update(&[self.from_status as u8]);
        hasher.update(&[self.to_status as u8]);
        hasher.update(&self.timestamp.to_le_bytes());
        if let Some(reason) = &self.reason {
            hasher.update(reason.as_bytes());
        }
        hasher.update(&self.prev_hash);
        hasher.finalize().as_bytes().to_vec()
    }

    /// Verify hash matches computed hash
    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Hex form of the hash, for logs
    pub fn hash_hex(&self) -> String {
        hex::encode(&self.hash)
    }
}

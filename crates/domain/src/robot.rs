//! Robot domain model
//!
//! The robot directory owns these records. The scheduler reads them to
//! decide availability and writes the freeze flag and the current run.

use flotilla_core::{AreaId, MissionRunId, RobotId};
use serde::{Deserialize, Serialize};

use crate::area::Position;

/// Robot availability as reported by the robot directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RobotStatus {
    /// Online and idle
    #[default]
    Available,
    /// Executing a mission run
    Busy,
    /// Not reachable
    Offline,
}

/// Robot record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Robot {
    /// Unique robot identifier
    pub id: RobotId,

    /// Display name
    pub name: String,

    /// Robot model (e.g. "TurtleBot", "ExRobotics")
    pub model: String,

    /// Area the robot currently operates in
    pub current_area: Option<AreaId>,

    /// Last known pose, if the controller reports one
    pub pose: Option<Position>,

    /// Availability
    pub status: RobotStatus,

    /// Run the robot is executing, if any
    pub current_mission_run: Option<MissionRunId>,

    /// Only emergency runs are dispatched while set
    pub mission_queue_frozen: bool,
}

impl Robot {
    /// Create a new available robot
    pub fn new(id: RobotId, name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            model: model.into(),
            current_area: None,
            pose: None,
            status: RobotStatus::Available,
            current_mission_run: None,
            mission_queue_frozen: false,
        }
    }

    /// Place the robot in an area
    pub fn with_area(mut self, area_id: AreaId) -> Self {
        self.current_area = Some(area_id);
        self
    }

    /// Set the robot pose
    pub fn with_pose(mut self, pose: Position) -> Self {
        self.pose = Some(pose);
        self
    }

    /// Check whether the robot can accept a new run right now
    pub fn is_available(&self) -> bool {
        self.status == RobotStatus::Available && self.current_mission_run.is_none()
    }

    /// Record that the robot started a run
    pub fn assign_mission_run(&mut self, mission_run_id: MissionRunId) {
        self.current_mission_run = Some(mission_run_id);
        self.status = RobotStatus::Busy;
    }

    /// Record that the robot no longer executes a run
    pub fn release_mission_run(&mut self) {
        self.current_mission_run = None;
        if self.status == RobotStatus::Busy {
            self.status = RobotStatus::Available;
        }
    }
}

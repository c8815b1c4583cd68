//! Robot controller gateway
//!
//! The scheduler talks to robots only through [`RobotController`]. Failures
//! carry the status code the controller answered with; 409 means the robot
//! is not in a state where the command applies.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use flotilla_core::{MissionRunId, RobotId};
use flotilla_domain::{MissionRun, Robot};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Controller rejected a command
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Controller error (status {status_code}): {message}")]
pub struct ControllerError {
    /// Status code reported by the controller
    pub status_code: u16,
    /// Controller message
    pub message: String,
}

impl ControllerError {
    /// Robot is not in a state where the command applies
    pub const STATUS_CONFLICT: u16 = 409;

    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Self::STATUS_CONFLICT, message)
    }

    pub fn is_conflict(&self) -> bool {
        self.status_code == Self::STATUS_CONFLICT
    }
}

/// Start and stop commands towards a robot
#[async_trait]
pub trait RobotController: Send + Sync {
    /// Ask the robot to start executing `mission_run`
    async fn start_mission(&self, robot: &Robot, mission_run: &MissionRun)
        -> Result<(), ControllerError>;

    /// Ask the robot to stop whatever it executes
    async fn stop_mission(&self, robot: &Robot) -> Result<(), ControllerError>;
}

/// Command received by the simulated controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControllerCommand {
    /// Start a run
    Start {
        robot_id: RobotId,
        mission_run_id: MissionRunId,
    },
    /// Stop the current run
    Stop { robot_id: RobotId },
}

#[derive(Debug, Default)]
struct SimulatedState {
    running: HashMap<RobotId, MissionRunId>,
    commands: Vec<ControllerCommand>,
    start_failures: HashMap<RobotId, VecDeque<ControllerError>>,
    stop_failures: HashMap<RobotId, VecDeque<ControllerError>>,
}

/// In-process controller that tracks which robot runs what.
///
/// Behaves like a real controller for conflicts: starting a robot that is
/// already running and stopping an idle robot both answer 409. Failures can
/// be queued per robot to exercise the error paths.
#[derive(Debug, Default)]
pub struct SimulatedController {
    state: Mutex<SimulatedState>,
    start_delay: Option<Duration>,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every start command, to widen race windows in tests
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Make the next start command for `robot_id` fail with `error`
    pub fn fail_next_start(&self, robot_id: &RobotId, error: ControllerError) {
        self.lock()
            .start_failures
            .entry(robot_id.clone())
            .or_default()
            .push_back(error);
    }

    /// Make the next stop command for `robot_id` fail with `error`
    pub fn fail_next_stop(&self, robot_id: &RobotId, error: ControllerError) {
        self.lock()
            .stop_failures
            .entry(robot_id.clone())
            .or_default()
            .push_back(error);
    }

    /// Run the robot currently executes
    pub fn running_mission(&self, robot_id: &RobotId) -> Option<MissionRunId> {
        self.lock().running.get(robot_id).cloned()
    }

    /// Robot finished on its own; returns the run it was executing
    pub fn finish(&self, robot_id: &RobotId) -> Option<MissionRunId> {
        self.lock().running.remove(robot_id)
    }

    /// Every command received so far, oldest first
    pub fn commands(&self) -> Vec<ControllerCommand> {
        self.lock().commands.clone()
    }

    /// Start commands received for `robot_id`
    pub fn starts_for(&self, robot_id: &RobotId) -> Vec<MissionRunId> {
        self.lock()
            .commands
            .iter()
            .filter_map(|command| match command {
                ControllerCommand::Start {
                    robot_id: target,
                    mission_run_id,
                } if target == robot_id => Some(mission_run_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RobotController for SimulatedController {
    async fn start_mission(
        &self,
        robot: &Robot,
        mission_run: &MissionRun,
    ) -> Result<(), ControllerError> {
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.commands.push(ControllerCommand::Start {
            robot_id: robot.id.clone(),
            mission_run_id: mission_run.id.clone(),
        });

        if let Some(error) = state
            .start_failures
            .get_mut(&robot.id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        if let Some(current) = state.running.get(&robot.id) {
            return Err(ControllerError::conflict(format!(
                "robot {} is already executing {}",
                robot.id, current
            )));
        }

        state
            .running
            .insert(robot.id.clone(), mission_run.id.clone());
        Ok(())
    }

    async fn stop_mission(&self, robot: &Robot) -> Result<(), ControllerError> {
        let mut state = self.lock();
        state.commands.push(ControllerCommand::Stop {
            robot_id: robot.id.clone(),
        });

        if let Some(error) = state
            .stop_failures
            .get_mut(&robot.id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        match state.running.remove(&robot.id) {
            Some(_) => Ok(()),
            None => Err(ControllerError::conflict(format!(
                "robot {} is not executing a mission",
                robot.id
            ))),
        }
    }
}

//! Mission scheduler
//!
//! [`MissionScheduler`] is the contract the event coordinator drives.
//! [`MissionSchedulingService`] implements it on top of the stores, the
//! robot controller and the event bus.

use std::sync::Arc;

use async_trait::async_trait;
use flotilla_core::{
    current_timestamp_ms, AreaId, MissionRunId, RobotAvailableArgs, RobotId, SchedulingEvent,
};
use flotilla_domain::{
    DomainError, MissionRun, MissionRunPriority, MissionRunQuery, MissionRunQueue, MissionStatus,
    Robot, RobotStatus,
};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::controller::RobotController;
use crate::error::{Result, SchedulingError, StoreError};
use crate::store::{AreaDirectory, MissionRunStore, RobotDirectory};

const SCHEDULER_SOURCE: &str = "mission-scheduler";

/// What a start attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Start command accepted, run is InProgress
    Started,
    /// Run left Pending before the attempt
    NotPending,
    /// Robot is busy, offline or already executing a run
    RobotUnavailable,
    /// Robot queue is frozen and the run is not an emergency
    QueueFrozen,
}

/// Operations the event coordinator drives
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MissionScheduler: Send + Sync {
    fn mission_run_queue_is_empty(&self, queue: &MissionRunQueue) -> bool;

    /// Start `mission_run` if it is still pending and its robot can take it.
    /// Callers hold the scheduling lock.
    async fn start_mission_run_if_system_is_available(
        &self,
        mission_run: &MissionRun,
    ) -> Result<StartOutcome>;

    async fn freeze_mission_run_queue_for_robot(&self, robot_id: &RobotId) -> Result<()>;

    async fn unfreeze_mission_run_queue_for_robot(&self, robot_id: &RobotId) -> Result<()>;

    async fn stop_current_mission_run(&self, robot_id: &RobotId) -> Result<()>;

    async fn schedule_mission_to_return_to_safe_position(
        &self,
        robot_id: &RobotId,
        area_id: &AreaId,
    ) -> Result<MissionRun>;

    /// The robot has a run that is in progress or paused
    async fn ongoing_mission(&self, robot_id: &RobotId) -> Result<bool>;

    fn trigger_robot_available(&self, args: RobotAvailableArgs);
}

/// Scheduler backed by the stores, a robot controller and the event bus
pub struct MissionSchedulingService {
    missions: Arc<dyn MissionRunStore>,
    robots: Arc<dyn RobotDirectory>,
    areas: Arc<dyn AreaDirectory>,
    controller: Arc<dyn RobotController>,
    events: EventBus,
}

impl MissionSchedulingService {
    pub fn new(
        missions: Arc<dyn MissionRunStore>,
        robots: Arc<dyn RobotDirectory>,
        areas: Arc<dyn AreaDirectory>,
        controller: Arc<dyn RobotController>,
        events: EventBus,
    ) -> Self {
        Self {
            missions,
            robots,
            areas,
            controller,
            events,
        }
    }

    /// Record a terminal status reported for a run, free its robot and
    /// let the next queued run start.
    pub async fn complete_mission_run(
        &self,
        mission_run_id: &MissionRunId,
        status: MissionStatus,
    ) -> Result<MissionRun> {
        if !status.is_terminal() {
            return Err(DomainError::ValidationError(format!(
                "{:?} is not a terminal mission status",
                status
            ))
            .into());
        }

        let run = self
            .missions
            .update_status(mission_run_id, status, current_timestamp_ms(), None)
            .await
            .map_err(|e| mission_store_error(mission_run_id, e))?;
        self.release_robot(&run.robot_id, &run.id).await?;

        info!(mission_run_id = %run.id, robot_id = %run.robot_id, ?status, "Mission run finished");
        self.trigger_robot_available(RobotAvailableArgs::new(run.robot_id.clone()));
        Ok(run)
    }

    /// Update robot availability; a robot coming back online may take the
    /// next queued run.
    pub async fn set_robot_status(&self, robot_id: &RobotId, status: RobotStatus) -> Result<Robot> {
        let robot = self
            .robots
            .set_status(robot_id, status)
            .await
            .map_err(|e| robot_store_error(robot_id, e))?;

        info!(robot_id = %robot_id, ?status, "Robot status updated");
        if robot.is_available() {
            self.trigger_robot_available(RobotAvailableArgs::new(robot_id.clone()));
        }
        Ok(robot)
    }

    async fn record_start(&self, mission_run_id: &MissionRunId, robot_id: &RobotId) -> Result<()> {
        self.missions
            .update_status(mission_run_id, MissionStatus::InProgress, current_timestamp_ms(), None)
            .await?;
        self.robots
            .assign_mission_run(robot_id, mission_run_id)
            .await
            .map_err(|e| robot_store_error(robot_id, e))?;
        Ok(())
    }

    async fn load_robot(&self, robot_id: &RobotId) -> Result<Robot> {
        self.robots
            .read_by_id(robot_id)
            .await?
            .ok_or_else(|| SchedulingError::RobotNotFound(robot_id.clone()))
    }

    async fn current_mission_run_id(&self, robot: &Robot) -> Result<Option<MissionRunId>> {
        if let Some(id) = &robot.current_mission_run {
            return Ok(Some(id.clone()));
        }
        let ongoing = self
            .missions
            .read_all(&MissionRunQuery::ongoing(robot.id.clone(), 1))
            .await?;
        Ok(ongoing.into_iter().next().map(|run| run.id))
    }

    async fn abort_mission_run(&self, mission_run_id: &MissionRunId, reason: &str) {
        match self
            .missions
            .update_status(
                mission_run_id,
                MissionStatus::Aborted,
                current_timestamp_ms(),
                Some(reason.to_string()),
            )
            .await
        {
            Ok(_) => {}
            Err(StoreError::InvalidTransition(e)) => {
                warn!(mission_run_id = %mission_run_id, error = %e, "Mission run already finished");
            }
            Err(e) => {
                error!(mission_run_id = %mission_run_id, error = %e, "Failed to mark mission run aborted");
            }
        }
    }

    async fn release_robot(&self, robot_id: &RobotId, mission_run_id: &MissionRunId) -> Result<()> {
        let robot = self.load_robot(robot_id).await?;
        if robot.current_mission_run.as_ref() == Some(mission_run_id) {
            self.robots
                .release_mission_run(robot_id)
                .await
                .map_err(|e| robot_store_error(robot_id, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl MissionScheduler for MissionSchedulingService {
    fn mission_run_queue_is_empty(&self, queue: &MissionRunQueue) -> bool {
        queue.is_empty()
    }

    async fn start_mission_run_if_system_is_available(
        &self,
        mission_run: &MissionRun,
    ) -> Result<StartOutcome> {
        let run = self
            .missions
            .read_by_id(&mission_run.id)
            .await?
            .ok_or_else(|| SchedulingError::mission_run_not_found(&mission_run.id))?;

        if !run.is_pending() {
            debug!(mission_run_id = %run.id, status = ?run.status, "Mission run is no longer pending");
            return Ok(StartOutcome::NotPending);
        }

        let robot = self.load_robot(&run.robot_id).await?;

        if robot.mission_queue_frozen && !run.is_emergency() {
            info!(
                mission_run_id = %run.id,
                robot_id = %robot.id,
                "Mission run not started, robot queue is frozen"
            );
            return Ok(StartOutcome::QueueFrozen);
        }

        if !robot.is_available() || self.ongoing_mission(&robot.id).await? {
            info!(
                mission_run_id = %run.id,
                robot_id = %robot.id,
                robot_status = ?robot.status,
                "Mission run not started, robot is not available"
            );
            return Ok(StartOutcome::RobotUnavailable);
        }

        if let Err(e) = self.controller.start_mission(&robot, &run).await {
            error!(
                mission_run_id = %run.id,
                robot_id = %robot.id,
                status_code = e.status_code,
                "Robot controller rejected start: {}",
                e.message
            );
            self.missions
                .update_status(
                    &run.id,
                    MissionStatus::Failed,
                    current_timestamp_ms(),
                    Some(format!("start rejected by controller: {}", e.message)),
                )
                .await?;
            self.trigger_robot_available(RobotAvailableArgs::chained(robot.id.clone()));
            return Err(e.into());
        }

        if let Err(e) = self.record_start(&run.id, &robot.id).await {
            error!(
                mission_run_id = %run.id,
                robot_id = %robot.id,
                error = %e,
                "Robot accepted the start but it was not recorded, store and robot disagree"
            );
            return Err(e);
        }

        info!(
            mission_run_id = %run.id,
            robot_id = %robot.id,
            priority = ?run.priority,
            "Mission run started"
        );
        Ok(StartOutcome::Started)
    }

    async fn freeze_mission_run_queue_for_robot(&self, robot_id: &RobotId) -> Result<()> {
        self.robots
            .set_mission_queue_frozen(robot_id, true)
            .await
            .map_err(|e| robot_store_error(robot_id, e))?;
        info!(robot_id = %robot_id, "Mission run queue frozen");
        Ok(())
    }

    async fn unfreeze_mission_run_queue_for_robot(&self, robot_id: &RobotId) -> Result<()> {
        self.robots
            .set_mission_queue_frozen(robot_id, false)
            .await
            .map_err(|e| robot_store_error(robot_id, e))?;
        info!(robot_id = %robot_id, "Mission run queue unfrozen");
        Ok(())
    }

    async fn stop_current_mission_run(&self, robot_id: &RobotId) -> Result<()> {
        let robot = self.load_robot(robot_id).await?;
        let mission_run_id = self.current_mission_run_id(&robot).await?.ok_or_else(|| {
            SchedulingError::MissionRunNotFound(format!("no ongoing mission run for robot {}", robot_id))
        })?;

        match self.controller.stop_mission(&robot).await {
            Ok(()) => {
                self.abort_mission_run(&mission_run_id, "stopped on request").await;
                self.release_robot(robot_id, &mission_run_id).await?;
                info!(robot_id = %robot_id, mission_run_id = %mission_run_id, "Mission run stopped");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                // Controller is idle while the store still shows a run.
                self.abort_mission_run(&mission_run_id, "robot controller reported idle")
                    .await;
                self.release_robot(robot_id, &mission_run_id).await?;
                warn!(
                    robot_id = %robot_id,
                    mission_run_id = %mission_run_id,
                    "Stop conflicted, robot was already idle: {}",
                    e.message
                );
                Err(e.into())
            }
            Err(e) => {
                error!(
                    robot_id = %robot_id,
                    status_code = e.status_code,
                    "Failed to stop mission run: {}",
                    e.message
                );
                Err(e.into())
            }
        }
    }

    async fn schedule_mission_to_return_to_safe_position(
        &self,
        robot_id: &RobotId,
        area_id: &AreaId,
    ) -> Result<MissionRun> {
        let robot = self.load_robot(robot_id).await?;
        let area = self
            .areas
            .read_by_id(area_id)
            .await?
            .ok_or_else(|| SchedulingError::AreaNotFound(area_id.clone()))?;

        let safe_position = area.nearest_safe_position(robot.pose.as_ref()).ok_or_else(|| {
            SchedulingError::SafeZone {
                area_id: area_id.clone(),
                reason: "no safe position defined for area".to_string(),
            }
        })?;

        let now = current_timestamp_ms();
        let run = MissionRun::new(
            MissionRunId::generate(),
            format!("Return to safe position {}", safe_position.name),
            robot.id.clone(),
            now,
        )
        .with_priority(MissionRunPriority::Emergency)
        .with_area(area.id.clone())
        .with_destination(safe_position.position);

        let run = self.missions.create(run).await?;
        info!(
            robot_id = %robot_id,
            area_id = %area_id,
            mission_run_id = %run.id,
            safe_position = %safe_position.name,
            "Scheduled return to safe position"
        );
        Ok(run)
    }

    async fn ongoing_mission(&self, robot_id: &RobotId) -> Result<bool> {
        let ongoing = self
            .missions
            .read_all(&MissionRunQuery::ongoing(robot_id.clone(), 1))
            .await?;
        Ok(!ongoing.is_empty())
    }

    fn trigger_robot_available(&self, args: RobotAvailableArgs) {
        debug!(robot_id = %args.robot_id, origin = ?args.origin, "Raising RobotAvailable");
        self.events
            .emit(SchedulingEvent::RobotAvailable(args), SCHEDULER_SOURCE);
    }
}

fn robot_store_error(robot_id: &RobotId, err: StoreError) -> SchedulingError {
    match err {
        StoreError::NotFound(_) => SchedulingError::RobotNotFound(robot_id.clone()),
        other => other.into(),
    }
}

fn mission_store_error(mission_run_id: &MissionRunId, err: StoreError) -> SchedulingError {
    match err {
        StoreError::NotFound(_) => SchedulingError::mission_run_not_found(mission_run_id),
        other => other.into(),
    }
}

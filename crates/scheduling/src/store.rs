//! Mission store, robot directory and area directory
//!
//! The scheduler only sees these traits. Every write is a read-modify-write
//! performed under the store's own lock, so the emergency workflow (which
//! runs outside the scheduling lock) cannot overwrite a concurrent start.
//! The in-memory implementations back the node service and the tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flotilla_core::{AreaId, MissionRunId, RobotId, SchedulingEvent};
use flotilla_domain::{Area, MissionRun, MissionRunQuery, MissionStatus, Robot, RobotStatus};
use tokio::sync::RwLock;
use tracing::debug;

use crate::bus::EventBus;
use crate::error::StoreError;

const STORE_SOURCE: &str = "mission-store";

/// Record of mission runs
#[async_trait]
pub trait MissionRunStore: Send + Sync {
    async fn read_by_id(&self, id: &MissionRunId) -> Result<Option<MissionRun>, StoreError>;

    /// Rows matching `query`, in query order, at most `query.page_size`
    async fn read_all(&self, query: &MissionRunQuery) -> Result<Vec<MissionRun>, StoreError>;

    async fn create(&self, mission_run: MissionRun) -> Result<MissionRun, StoreError>;

    /// Move a run to `status`, appending to its transition history
    async fn update_status(
        &self,
        id: &MissionRunId,
        status: MissionStatus,
        timestamp: u64,
        reason: Option<String>,
    ) -> Result<MissionRun, StoreError>;
}

/// Record of robots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RobotDirectory: Send + Sync {
    async fn read_by_id(&self, id: &RobotId) -> Result<Option<Robot>, StoreError>;

    async fn read_all(&self) -> Result<Vec<Robot>, StoreError>;

    async fn set_mission_queue_frozen(&self, id: &RobotId, frozen: bool)
        -> Result<Robot, StoreError>;

    async fn assign_mission_run(
        &self,
        id: &RobotId,
        mission_run_id: &MissionRunId,
    ) -> Result<Robot, StoreError>;

    async fn release_mission_run(&self, id: &RobotId) -> Result<Robot, StoreError>;

    async fn set_status(&self, id: &RobotId, status: RobotStatus) -> Result<Robot, StoreError>;
}

/// Record of areas
#[async_trait]
pub trait AreaDirectory: Send + Sync {
    async fn read_by_id(&self, id: &AreaId) -> Result<Option<Area>, StoreError>;
}

/// Mission store held in memory
#[derive(Clone, Default)]
pub struct InMemoryMissionRunStore {
    runs: Arc<RwLock<HashMap<MissionRunId, MissionRun>>>,
    events: Option<EventBus>,
}

impl InMemoryMissionRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish MissionRunCreated on `bus` after every create
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Number of stored runs
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

#[async_trait]
impl MissionRunStore for InMemoryMissionRunStore {
    async fn read_by_id(&self, id: &MissionRunId) -> Result<Option<MissionRun>, StoreError> {
        Ok(self.runs.read().await.get(id).cloned())
    }

    async fn read_all(&self, query: &MissionRunQuery) -> Result<Vec<MissionRun>, StoreError> {
        let runs = self.runs.read().await;
        Ok(query.apply(runs.values()))
    }

    async fn create(&self, mission_run: MissionRun) -> Result<MissionRun, StoreError> {
        {
            let mut runs = self.runs.write().await;
            if runs.contains_key(&mission_run.id) {
                return Err(StoreError::AlreadyExists(mission_run.id.to_string()));
            }
            runs.insert(mission_run.id.clone(), mission_run.clone());
        }

        debug!(mission_run_id = %mission_run.id, robot_id = %mission_run.robot_id, "Mission run created");

        if let Some(bus) = &self.events {
            bus.emit(
                SchedulingEvent::MissionRunCreated {
                    mission_run_id: mission_run.id.clone(),
                },
                STORE_SOURCE,
            );
        }

        Ok(mission_run)
    }

    async fn update_status(
        &self,
        id: &MissionRunId,
        status: MissionStatus,
        timestamp: u64,
        reason: Option<String>,
    ) -> Result<MissionRun, StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        run.transition(status, timestamp, reason)?;
        Ok(run.clone())
    }
}

/// Robot directory held in memory
#[derive(Clone, Default)]
pub struct InMemoryRobotDirectory {
    robots: Arc<RwLock<HashMap<RobotId, Robot>>>,
}

impl InMemoryRobotDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory seeded with `robots`
    pub fn with_robots(robots: impl IntoIterator<Item = Robot>) -> Self {
        let robots = robots
            .into_iter()
            .map(|robot| (robot.id.clone(), robot))
            .collect();
        Self {
            robots: Arc::new(RwLock::new(robots)),
        }
    }

    /// Add or replace a robot
    pub async fn insert(&self, robot: Robot) {
        self.robots.write().await.insert(robot.id.clone(), robot);
    }

    async fn modify<F>(&self, id: &RobotId, f: F) -> Result<Robot, StoreError>
    where
        F: FnOnce(&mut Robot) + Send,
    {
        let mut robots = self.robots.write().await;
        let robot = robots
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(robot);
        Ok(robot.clone())
    }
}

#[async_trait]
impl RobotDirectory for InMemoryRobotDirectory {
    async fn read_by_id(&self, id: &RobotId) -> Result<Option<Robot>, StoreError> {
        Ok(self.robots.read().await.get(id).cloned())
    }

    async fn read_all(&self) -> Result<Vec<Robot>, StoreError> {
        let mut robots: Vec<Robot> = self.robots.read().await.values().cloned().collect();
        robots.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(robots)
    }

    async fn set_mission_queue_frozen(
        &self,
        id: &RobotId,
        frozen: bool,
    ) -> Result<Robot, StoreError> {
        self.modify(id, |robot| robot.mission_queue_frozen = frozen)
            .await
    }

    async fn assign_mission_run(
        &self,
        id: &RobotId,
        mission_run_id: &MissionRunId,
    ) -> Result<Robot, StoreError> {
        let mission_run_id = mission_run_id.clone();
        self.modify(id, move |robot| robot.assign_mission_run(mission_run_id))
            .await
    }

    async fn release_mission_run(&self, id: &RobotId) -> Result<Robot, StoreError> {
        self.modify(id, Robot::release_mission_run).await
    }

    async fn set_status(&self, id: &RobotId, status: RobotStatus) -> Result<Robot, StoreError> {
        self.modify(id, |robot| robot.status = status).await
    }
}

/// Area directory held in memory
#[derive(Clone, Default)]
pub struct InMemoryAreaDirectory {
    areas: Arc<RwLock<HashMap<AreaId, Area>>>,
}

impl InMemoryAreaDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_areas(areas: impl IntoIterator<Item = Area>) -> Self {
        let areas = areas
            .into_iter()
            .map(|area| (area.id.clone(), area))
            .collect();
        Self {
            areas: Arc::new(RwLock::new(areas)),
        }
    }

    pub async fn insert(&self, area: Area) {
        self.areas.write().await.insert(area.id.clone(), area);
    }
}

#[async_trait]
impl AreaDirectory for InMemoryAreaDirectory {
    async fn read_by_id(&self, id: &AreaId) -> Result<Option<Area>, StoreError> {
        Ok(self.areas.read().await.get(id).cloned())
    }
}

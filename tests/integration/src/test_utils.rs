//! Shared fixtures for the scheduling integration tests

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flotilla_core::{
    AreaId, MissionRunId, RobotAvailableArgs, RobotId, SchedulerConfig, SchedulingEvent,
};
use flotilla_domain::{
    Area, MissionRun, MissionRunPriority, MissionRunQueue, MissionStatus, Position, Robot,
};
use flotilla_scheduling::{
    EventBus, EventCoordinator, InMemoryAreaDirectory, InMemoryMissionRunStore,
    InMemoryRobotDirectory, MissionRunStore, MissionScheduler, MissionSchedulingService,
    RobotDirectory, SchedulingLock, SimulatedController, StartOutcome,
};

pub const TEST_SOURCE: &str = "integration-test";

/// Initialize tracing only if not already initialized
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Poll `check` until it holds or two seconds pass
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub fn robot_id(id: &str) -> RobotId {
    RobotId::from(id)
}

pub fn mission_run(id: &str, robot: &str, desired_start_time: u64) -> MissionRun {
    MissionRun::new(
        MissionRunId::from(id),
        format!("Inspection {id}"),
        RobotId::from(robot),
        desired_start_time,
    )
}

pub fn emergency_run(id: &str, robot: &str, desired_start_time: u64) -> MissionRun {
    mission_run(id, robot, desired_start_time).with_priority(MissionRunPriority::Emergency)
}

/// Area with one safe position
pub fn deck_a() -> Area {
    Area::new(AreaId::from("deck-a"), "Weather deck A")
        .with_safe_position("north-dock", Position::new(0.0, 50.0, 0.0))
}

/// Area without safe positions
pub fn deck_b() -> Area {
    Area::new(AreaId::from("deck-b"), "Weather deck B")
}

/// Full scheduling stack wired to one bus, with a simulated controller
pub struct TestFleet {
    pub bus: EventBus,
    pub missions: InMemoryMissionRunStore,
    pub robots: InMemoryRobotDirectory,
    pub areas: InMemoryAreaDirectory,
    pub controller: Arc<SimulatedController>,
    pub service: Arc<MissionSchedulingService>,
    pub coordinator: EventCoordinator,
}

impl TestFleet {
    /// Robots r1 and r2 on deck A, r3 on deck B
    pub fn new() -> Self {
        Self::with_controller(SimulatedController::new(), SchedulerConfig::default())
    }

    pub fn with_controller(controller: SimulatedController, config: SchedulerConfig) -> Self {
        Self::build(controller, config, 256)
    }

    /// Default fleet on a bus that buffers only `capacity` events
    pub fn with_bus_capacity(capacity: usize) -> Self {
        Self::build(SimulatedController::new(), SchedulerConfig::default(), capacity)
    }

    fn build(controller: SimulatedController, config: SchedulerConfig, capacity: usize) -> Self {
        let bus = EventBus::new(capacity);
        let missions = InMemoryMissionRunStore::new().with_event_bus(bus.clone());
        let robots = InMemoryRobotDirectory::with_robots([
            Robot::new(robot_id("r1"), "Edward", "TurtleBot").with_area(AreaId::from("deck-a")),
            Robot::new(robot_id("r2"), "Anna", "ExRobotics").with_area(AreaId::from("deck-a")),
            Robot::new(robot_id("r3"), "Bob", "ANYmal").with_area(AreaId::from("deck-b")),
        ]);
        let areas = InMemoryAreaDirectory::with_areas([deck_a(), deck_b()]);
        let controller = Arc::new(controller);

        let service = Arc::new(MissionSchedulingService::new(
            Arc::new(missions.clone()),
            Arc::new(robots.clone()),
            Arc::new(areas.clone()),
            controller.clone(),
            bus.clone(),
        ));
        let coordinator = EventCoordinator::new(
            service.clone(),
            Arc::new(missions.clone()),
            Arc::new(robots.clone()),
            Arc::new(areas.clone()),
            bus.clone(),
            SchedulingLock::new(),
            config,
        );

        Self {
            bus,
            missions,
            robots,
            areas,
            controller,
            service,
            coordinator,
        }
    }

    /// Store runs while nobody listens, so no event fires for them
    pub async fn seed(&self, runs: impl IntoIterator<Item = MissionRun>) {
        for run in runs {
            self.missions.create(run).await.unwrap();
        }
    }

    pub fn publish(&self, event: SchedulingEvent) {
        self.bus.emit(event, TEST_SOURCE);
    }

    pub fn robot_available(&self, robot: &str) {
        self.publish(SchedulingEvent::RobotAvailable(RobotAvailableArgs::new(
            robot_id(robot),
        )));
    }

    pub async fn robot(&self, robot: &str) -> Robot {
        self.robots
            .read_by_id(&robot_id(robot))
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn run(&self, id: &str) -> MissionRun {
        self.missions
            .read_by_id(&MissionRunId::from(id))
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn status(&self, id: &str) -> MissionStatus {
        self.run(id).await.status
    }

    /// Wait until run `id` reaches `status`
    pub async fn wait_for_status(&self, id: &str, status: MissionStatus) -> bool {
        let fleet = self;
        wait_until(move || async move { fleet.status(id).await == status }).await
    }
}

impl Default for TestFleet {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler stand-in that measures how many starts overlap
#[derive(Default)]
pub struct ProbeScheduler {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<MissionRunId>>,
}

impl ProbeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<MissionRunId> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl MissionScheduler for ProbeScheduler {
    fn mission_run_queue_is_empty(&self, queue: &MissionRunQueue) -> bool {
        queue.is_empty()
    }

    async fn start_mission_run_if_system_is_available(
        &self,
        mission_run: &MissionRun,
    ) -> flotilla_scheduling::Result<StartOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(5)).await;
        self.started.lock().unwrap().push(mission_run.id.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(StartOutcome::Started)
    }

    async fn freeze_mission_run_queue_for_robot(
        &self,
        _robot_id: &RobotId,
    ) -> flotilla_scheduling::Result<()> {
        Ok(())
    }

    async fn unfreeze_mission_run_queue_for_robot(
        &self,
        _robot_id: &RobotId,
    ) -> flotilla_scheduling::Result<()> {
        Ok(())
    }

    async fn stop_current_mission_run(
        &self,
        _robot_id: &RobotId,
    ) -> flotilla_scheduling::Result<()> {
        Ok(())
    }

    async fn schedule_mission_to_return_to_safe_position(
        &self,
        robot_id: &RobotId,
        _area_id: &AreaId,
    ) -> flotilla_scheduling::Result<MissionRun> {
        Ok(emergency_run("probe-safe", robot_id.as_str(), 0))
    }

    async fn ongoing_mission(&self, _robot_id: &RobotId) -> flotilla_scheduling::Result<bool> {
        Ok(false)
    }

    fn trigger_robot_available(&self, _args: RobotAvailableArgs) {}
}

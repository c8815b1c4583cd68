//! Start decisions under concurrent events

use std::sync::Arc;
use std::time::Duration;

use flotilla_core::{MissionRunId, SchedulerConfig, SchedulingEvent};
use flotilla_domain::{MissionRunQuery, MissionStatus};
use flotilla_scheduling::{
    EventBus, EventCoordinator, InMemoryAreaDirectory, InMemoryMissionRunStore, MissionRunStore,
    SchedulingLock, SimulatedController,
};

use crate::test_utils::*;

#[tokio::test]
async fn test_start_calls_never_overlap() {
    init_tracing();
    let missions = InMemoryMissionRunStore::new();
    let runs: Vec<String> = (0..16).map(|i| format!("C{i:02}")).collect();
    for (i, id) in runs.iter().enumerate() {
        let robot = ["r1", "r2", "r3"][i % 3];
        missions
            .create(mission_run(id, robot, i as u64))
            .await
            .unwrap();
    }

    let probe = Arc::new(ProbeScheduler::new());
    let fleet = TestFleet::new();
    let coordinator = EventCoordinator::new(
        probe.clone(),
        Arc::new(missions),
        Arc::new(fleet.robots.clone()),
        Arc::new(InMemoryAreaDirectory::with_areas([deck_a(), deck_b()])),
        EventBus::new(16),
        SchedulingLock::new(),
        SchedulerConfig::default(),
    );

    let mut handles = Vec::new();
    for id in &runs {
        let coordinator = coordinator.clone();
        let id = MissionRunId::new(id.clone());
        handles.push(tokio::spawn(async move {
            coordinator.on_mission_run_created(&id).await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(probe.max_in_flight(), 1);
    assert_eq!(probe.started().len(), runs.len());
}

#[tokio::test]
async fn test_concurrent_events_start_one_run_per_robot() {
    init_tracing();
    let controller = SimulatedController::new().with_start_delay(Duration::from_millis(20));
    let fleet = TestFleet::with_controller(controller, SchedulerConfig::default());
    let mut ids = Vec::new();
    for i in 0..8u64 {
        ids.push(format!("A{i}"));
        ids.push(format!("B{i}"));
    }
    for i in 0..8u64 {
        fleet.seed([mission_run(&format!("A{i}"), "r1", i)]).await;
        fleet.seed([mission_run(&format!("B{i}"), "r2", i)]).await;
    }
    fleet.coordinator.start().unwrap();

    for id in &ids {
        fleet.publish(SchedulingEvent::MissionRunCreated {
            mission_run_id: MissionRunId::new(id.clone()),
        });
    }
    fleet.robot_available("r1");
    fleet.robot_available("r2");

    let fleet_ref = &fleet;
    assert!(
        wait_until(move || async move {
            fleet_ref.robot("r1").await.current_mission_run.is_some()
                && fleet_ref.robot("r2").await.current_mission_run.is_some()
        })
        .await
    );
    // Let the remaining handlers drain.
    tokio::time::sleep(Duration::from_millis(300)).await;
    fleet.coordinator.stop().await;

    assert_eq!(fleet.controller.starts_for(&robot_id("r1")).len(), 1);
    assert_eq!(fleet.controller.starts_for(&robot_id("r2")).len(), 1);

    for robot in ["r1", "r2"] {
        let ongoing = fleet
            .missions
            .read_all(&MissionRunQuery::ongoing(robot_id(robot), 100))
            .await
            .unwrap();
        assert_eq!(ongoing.len(), 1);
        assert_eq!(
            fleet.robot(robot).await.current_mission_run,
            Some(ongoing[0].id.clone())
        );
    }
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_handlers() {
    init_tracing();
    let controller = SimulatedController::new().with_start_delay(Duration::from_millis(100));
    let fleet = TestFleet::with_controller(controller, SchedulerConfig::default());
    fleet.seed([mission_run("R1", "r1", 1)]).await;
    fleet.coordinator.start().unwrap();

    fleet.robot_available("r1");
    tokio::time::sleep(Duration::from_millis(20)).await;
    fleet.coordinator.stop().await;

    assert_eq!(fleet.status("R1").await, MissionStatus::InProgress);
    assert_eq!(fleet.bus.subscriber_count(), 0);

    // Events after stop are not handled.
    fleet.seed([mission_run("R2", "r2", 1)]).await;
    fleet.robot_available("r2");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fleet.status("R2").await, MissionStatus::Pending);
}

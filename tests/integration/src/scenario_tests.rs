//! End-to-end scheduling scenarios over the event bus

use std::time::Duration;

use flotilla_core::{MissionRunId, SchedulerConfig, SchedulingEvent};
use flotilla_domain::MissionStatus;
use flotilla_scheduling::{
    ControllerError, HandlerOutcome, MissionRunStore, MissionScheduler, RobotDirectory,
    SimulatedController,
};

use crate::test_utils::*;

#[tokio::test]
async fn test_created_run_starts_on_available_robot() {
    init_tracing();
    let fleet = TestFleet::new();
    fleet.coordinator.start().unwrap();

    fleet.missions.create(mission_run("R1", "r1", 10)).await.unwrap();

    assert!(fleet.wait_for_status("R1", MissionStatus::InProgress).await);
    assert_eq!(
        fleet.robot("r1").await.current_mission_run,
        Some(MissionRunId::from("R1"))
    );
    assert_eq!(
        fleet.controller.running_mission(&robot_id("r1")),
        Some(MissionRunId::from("R1"))
    );

    fleet.coordinator.stop().await;
}

#[tokio::test]
async fn test_available_robot_takes_earliest_run() {
    init_tracing();
    let fleet = TestFleet::new();
    fleet
        .seed([mission_run("R1", "r1", 10), mission_run("R2", "r1", 5)])
        .await;
    fleet.coordinator.start().unwrap();

    fleet.robot_available("r1");

    assert!(fleet.wait_for_status("R2", MissionStatus::InProgress).await);
    assert_eq!(fleet.status("R1").await, MissionStatus::Pending);

    fleet.coordinator.stop().await;
}

#[tokio::test]
async fn test_frozen_robot_takes_emergency_run() {
    init_tracing();
    let fleet = TestFleet::new();
    fleet
        .robots
        .set_mission_queue_frozen(&robot_id("r1"), true)
        .await
        .unwrap();
    fleet
        .seed([
            mission_run("R1", "r1", 10),
            mission_run("R2", "r1", 5),
            emergency_run("R3", "r1", 20),
        ])
        .await;
    fleet.coordinator.start().unwrap();

    fleet.robot_available("r1");

    assert!(fleet.wait_for_status("R3", MissionStatus::InProgress).await);
    assert_eq!(fleet.status("R1").await, MissionStatus::Pending);
    assert_eq!(fleet.status("R2").await, MissionStatus::Pending);

    fleet.coordinator.stop().await;
}

#[tokio::test]
async fn test_emergency_press_with_idle_controller_reaches_safe_position() {
    init_tracing();
    let fleet = TestFleet::new();
    fleet.seed([mission_run("R0", "r1", 1)]).await;
    let r0 = fleet.run("R0").await;
    fleet
        .service
        .start_mission_run_if_system_is_available(&r0)
        .await
        .unwrap();
    // Robot finished without the store hearing about it; stop answers 409.
    fleet.controller.finish(&robot_id("r1"));
    fleet.coordinator.start().unwrap();

    let outcome = fleet
        .coordinator
        .on_emergency_button_pressed(&robot_id("r1"))
        .await;

    let HandlerOutcome::EmergencyStopped {
        safe_position_run: Some(safe_run_id),
        robot_available_raised: true,
    } = outcome
    else {
        panic!("unexpected outcome: {outcome:?}");
    };

    assert!(
        fleet
            .wait_for_status(safe_run_id.as_str(), MissionStatus::InProgress)
            .await
    );
    let safe_run = fleet.run(safe_run_id.as_str()).await;
    assert!(safe_run.is_emergency());
    assert!(safe_run.destination.is_some());
    assert_eq!(fleet.status("R0").await, MissionStatus::Aborted);
    assert!(fleet.robot("r1").await.mission_queue_frozen);
    assert_eq!(
        fleet
            .controller
            .starts_for(&robot_id("r1"))
            .iter()
            .filter(|id| **id == safe_run_id)
            .count(),
        1
    );

    fleet.coordinator.stop().await;
}

#[tokio::test]
async fn test_emergency_press_stop_failure_leaves_robot_frozen() {
    init_tracing();
    let fleet = TestFleet::new();
    fleet.seed([mission_run("R0", "r1", 1)]).await;
    let r0 = fleet.run("R0").await;
    fleet
        .service
        .start_mission_run_if_system_is_available(&r0)
        .await
        .unwrap();
    fleet
        .controller
        .fail_next_stop(&robot_id("r1"), ControllerError::new(503, "robot unreachable"));

    let outcome = fleet
        .coordinator
        .on_emergency_button_pressed(&robot_id("r1"))
        .await;

    assert!(matches!(outcome, HandlerOutcome::Aborted { .. }));
    assert!(fleet.robot("r1").await.mission_queue_frozen);
    assert_eq!(fleet.status("R0").await, MissionStatus::InProgress);
    assert_eq!(fleet.missions.len().await, 1);
}

#[tokio::test]
async fn test_emergency_press_without_safe_position_unfreezes() {
    init_tracing();
    let fleet = TestFleet::new();
    fleet
        .seed([mission_run("R5", "r3", 1), mission_run("R6", "r3", 2)])
        .await;
    let r5 = fleet.run("R5").await;
    fleet
        .service
        .start_mission_run_if_system_is_available(&r5)
        .await
        .unwrap();
    fleet.coordinator.start().unwrap();

    let outcome = fleet
        .coordinator
        .on_emergency_button_pressed(&robot_id("r3"))
        .await;

    assert_eq!(
        outcome,
        HandlerOutcome::EmergencyStopped {
            safe_position_run: None,
            robot_available_raised: true,
        }
    );
    assert_eq!(fleet.status("R5").await, MissionStatus::Aborted);
    assert!(!fleet.robot("r3").await.mission_queue_frozen);
    // The raised RobotAvailable lets the queue carry on.
    assert!(fleet.wait_for_status("R6", MissionStatus::InProgress).await);

    fleet.coordinator.stop().await;
}

#[tokio::test]
async fn test_release_of_unfrozen_robot_raises_availability() {
    init_tracing();
    let fleet = TestFleet::new();
    fleet.seed([mission_run("R1", "r1", 10)]).await;
    fleet.coordinator.start().unwrap();

    let outcome = fleet
        .coordinator
        .on_emergency_button_depressed(&robot_id("r1"))
        .await;

    assert_eq!(
        outcome,
        HandlerOutcome::EmergencyReleased {
            ongoing_mission: false
        }
    );
    assert!(!fleet.robot("r1").await.mission_queue_frozen);
    assert!(fleet.wait_for_status("R1", MissionStatus::InProgress).await);

    fleet.coordinator.stop().await;
}

#[tokio::test]
async fn test_completed_run_hands_robot_to_next_run() {
    init_tracing();
    let fleet = TestFleet::new();
    fleet.coordinator.start().unwrap();

    fleet.missions.create(mission_run("R1", "r1", 10)).await.unwrap();
    assert!(fleet.wait_for_status("R1", MissionStatus::InProgress).await);

    fleet.missions.create(mission_run("R2", "r1", 20)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fleet.status("R2").await, MissionStatus::Pending);

    fleet.controller.finish(&robot_id("r1"));
    fleet
        .service
        .complete_mission_run(&MissionRunId::from("R1"), MissionStatus::Completed)
        .await
        .unwrap();

    assert!(fleet.wait_for_status("R2", MissionStatus::InProgress).await);
    assert!(fleet.run("R1").await.verify_transitions());

    fleet.coordinator.stop().await;
}

#[tokio::test]
async fn test_emergency_cycle_holds_queue_until_release() {
    init_tracing();
    let fleet = TestFleet::new();
    fleet.coordinator.start().unwrap();

    fleet.missions.create(mission_run("R1", "r1", 10)).await.unwrap();
    assert!(fleet.wait_for_status("R1", MissionStatus::InProgress).await);
    fleet.missions.create(mission_run("R2", "r1", 20)).await.unwrap();

    fleet.publish(SchedulingEvent::EmergencyButtonPressed {
        robot_id: robot_id("r1"),
    });
    assert!(fleet.wait_for_status("R1", MissionStatus::Aborted).await);

    let fleet_ref = &fleet;
    assert!(
        wait_until(move || async move {
            fleet_ref
                .robot("r1")
                .await
                .current_mission_run
                .is_some_and(|id| id.as_str() != "R1")
        })
        .await
    );
    let safe_run_id = fleet
        .robot("r1")
        .await
        .current_mission_run
        .expect("safe-position run assigned");

    // Safe-position run done; the frozen queue keeps R2 waiting.
    fleet.controller.finish(&robot_id("r1"));
    fleet
        .service
        .complete_mission_run(&safe_run_id, MissionStatus::Completed)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fleet.status("R2").await, MissionStatus::Pending);

    fleet.publish(SchedulingEvent::EmergencyButtonDepressed {
        robot_id: robot_id("r1"),
    });
    assert!(fleet.wait_for_status("R2", MissionStatus::InProgress).await);

    fleet.coordinator.stop().await;
}

#[tokio::test]
async fn test_failing_starts_stop_after_chain_limit() {
    init_tracing();
    let config = SchedulerConfig {
        max_trigger_chain: 1,
        ..SchedulerConfig::default()
    };
    let fleet = TestFleet::with_controller(SimulatedController::new(), config);
    fleet
        .seed([
            mission_run("F1", "r2", 1),
            mission_run("F2", "r2", 2),
            mission_run("F3", "r2", 3),
        ])
        .await;
    for _ in 0..3 {
        fleet
            .controller
            .fail_next_start(&robot_id("r2"), ControllerError::new(500, "drive fault"));
    }
    fleet.coordinator.start().unwrap();

    fleet.robot_available("r2");

    assert!(fleet.wait_for_status("F2", MissionStatus::Failed).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fleet.status("F1").await, MissionStatus::Failed);
    assert_eq!(fleet.status("F3").await, MissionStatus::Pending);

    fleet.coordinator.stop().await;
}

#[tokio::test]
async fn test_overflowed_bus_still_starts_every_run() {
    init_tracing();
    let fleet = TestFleet::with_bus_capacity(2);
    fleet
        .seed([
            mission_run("P1", "r1", 1),
            mission_run("P2", "r2", 1),
            mission_run("P3", "r3", 1),
        ])
        .await;
    fleet.coordinator.start().unwrap();

    // One burst, before the listener gets to run: the three creations are
    // overwritten and only two availability events stay buffered.
    for id in ["P1", "P2", "P3"] {
        fleet.publish(SchedulingEvent::MissionRunCreated {
            mission_run_id: MissionRunId::from(id),
        });
    }
    fleet.robot_available("r1");
    fleet.robot_available("r2");

    for id in ["P1", "P2", "P3"] {
        assert!(
            fleet.wait_for_status(id, MissionStatus::InProgress).await,
            "{id} stayed pending"
        );
    }

    fleet.coordinator.stop().await;
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use flotilla_core::{logging, RobotAvailableArgs, SchedulingEvent};
use flotilla_scheduling::{
    EventBus, EventCoordinator, InMemoryAreaDirectory, InMemoryMissionRunStore,
    InMemoryRobotDirectory, MissionSchedulingService, RobotDirectory, SchedulingLock,
    SimulatedController,
};
use serde::Serialize;
use tracing::info;

mod config;

use config::NodeServiceConfig;

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_SOURCE: &str = "flotilla-node";

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config = match parse_config_path(&args)? {
        Some(path) => NodeServiceConfig::from_file(&path)?,
        None => NodeServiceConfig::default(),
    };

    logging::init_with(&config.base.logging);
    info!(
        node_id = %config.base.node.node_id,
        robots = config.fleet.robots.len(),
        areas = config.fleet.areas.len(),
        "Starting Flotilla node"
    );

    let bus = EventBus::new(config.base.scheduler.event_buffer);
    let missions = Arc::new(InMemoryMissionRunStore::new().with_event_bus(bus.clone()));
    let robots = Arc::new(InMemoryRobotDirectory::with_robots(
        config.fleet.robots.iter().map(|seed| seed.to_robot()),
    ));
    let areas = Arc::new(InMemoryAreaDirectory::with_areas(config.fleet.areas.clone()));
    let controller = Arc::new(SimulatedController::new());

    let scheduler = Arc::new(MissionSchedulingService::new(
        missions.clone(),
        robots.clone(),
        areas.clone(),
        controller,
        bus.clone(),
    ));
    let coordinator = EventCoordinator::new(
        scheduler,
        missions,
        robots.clone(),
        areas,
        bus.clone(),
        SchedulingLock::new(),
        config.base.scheduler.clone(),
    );
    coordinator.start()?;

    for robot in robots.read_all().await? {
        if robot.is_available() {
            bus.emit(
                SchedulingEvent::RobotAvailable(RobotAvailableArgs::new(robot.id)),
                NODE_SOURCE,
            );
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    coordinator.stop().await;
    Ok(())
}

fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            let path = args_iter
                .next()
                .context("--config was provided without a path")?;
            return Ok(Some(PathBuf::from(path)));
        }
    }
    Ok(None)
}

//! Core functionality for the Flotilla mission coordination system.
//!
//! This crate provides the fundamental types shared across the workspace:
//! identifiers, scheduling events, configuration and logging setup.

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod types;

pub use config::{Config, LoggingConfig, NodeConfig, SchedulerConfig};
pub use error::{CoreError, Result};
pub use event::{
    EventBuilder, EventEnvelope, EventKind, RobotAvailableArgs, SchedulingEvent,
    TriggerOrigin,
};
pub use types::{current_timestamp_ms, AreaId, MissionRunId, RobotId};

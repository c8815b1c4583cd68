//! Domain model for Flotilla mission coordination
//!
//! This crate contains pure domain logic with no I/O dependencies:
//! - Mission runs, their priorities and the status transition table
//! - Robots, areas and safe positions
//! - Mission run queries and the per-robot queue selection rule

pub mod area;
pub mod error;
pub mod mission;
pub mod query;
pub mod queue;
pub mod robot;

pub use area::{Area, Position, SafePosition};
pub use error::{DomainError, Result};
pub use mission::{MissionRun, MissionRunPriority, MissionStatus, StatusTransition};
pub use query::{MissionRunOrder, MissionRunQuery};
pub use queue::MissionRunQueue;
pub use robot::{Robot, RobotStatus};

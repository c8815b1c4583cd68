//! Event-driven mission scheduling for Flotilla.
//!
//! Events arrive on the [`EventBus`]; the [`EventCoordinator`] decides
//! whether a queued mission run should start and drives the
//! [`MissionScheduler`] to do it. Start decisions are serialized through a
//! single [`SchedulingLock`] so concurrent events never double-schedule a
//! robot.

pub mod bus;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod guard;
pub mod lock;
pub mod scheduler;
pub mod store;

pub use bus::{EventBus, Subscription};
pub use controller::{ControllerCommand, ControllerError, RobotController, SimulatedController};
pub use coordinator::{EventCoordinator, HandlerOutcome, IdleReason};
pub use error::{BusError, Result, SchedulingError, StoreError};
pub use guard::{ChainDecision, ChainGuard};
pub use lock::{SchedulingLock, SchedulingPermit};
pub use scheduler::{MissionScheduler, MissionSchedulingService, StartOutcome};
pub use store::{
    AreaDirectory, InMemoryAreaDirectory, InMemoryMissionRunStore, InMemoryRobotDirectory,
    MissionRunStore, RobotDirectory,
};

//! Event schema for mission scheduling events.
//!
//! Upstream components (mission creation, robot status tracking, the
//! emergency button) and the scheduler itself publish these events. Every
//! event is wrapped in an [`EventEnvelope`] carrying an id, a timestamp and the
//! publishing component.

use serde::{Deserialize, Serialize};

use crate::types::{current_timestamp_ms, MissionRunId, RobotId};

/// Kind of a scheduling event, used for subscription filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A mission run was written to the mission store
    MissionRunCreated,
    /// A robot may be able to take a new mission run
    RobotAvailable,
    /// The emergency button was pressed for a robot
    EmergencyButtonPressed,
    /// The emergency button was released for a robot
    EmergencyButtonDepressed,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [EventKind; 4] = [
        EventKind::MissionRunCreated,
        EventKind::RobotAvailable,
        EventKind::EmergencyButtonPressed,
        EventKind::EmergencyButtonDepressed,
    ];

    /// Dotted event type name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MissionRunCreated => event_types::MISSION_RUN_CREATED,
            EventKind::RobotAvailable => event_types::ROBOT_AVAILABLE,
            EventKind::EmergencyButtonPressed => event_types::EMERGENCY_BUTTON_PRESSED,
            EventKind::EmergencyButtonDepressed => event_types::EMERGENCY_BUTTON_DEPRESSED,
        }
    }
}

/// Where a RobotAvailable event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerOrigin {
    /// A fresh fact from outside the scheduling loop (status report, operator)
    External,
    /// Re-raised by the scheduler or coordinator to chain scheduling attempts
    Chained,
}

/// Arguments of a RobotAvailable event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotAvailableArgs {
    /// Robot that may take a new run
    pub robot_id: RobotId,
    /// Whether this is a fresh fact or a chained re-trigger
    pub origin: TriggerOrigin,
}

impl RobotAvailableArgs {
    /// Availability reported from outside the scheduling loop.
    pub fn new(robot_id: RobotId) -> Self {
        Self {
            robot_id,
            origin: TriggerOrigin::External,
        }
    }

    /// Availability re-raised from inside the scheduling loop.
    pub fn chained(robot_id: RobotId) -> Self {
        Self {
            robot_id,
            origin: TriggerOrigin::Chained,
        }
    }
}

/// A scheduling event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulingEvent {
    /// A mission run was created
    MissionRunCreated {
        /// The new run
        mission_run_id: MissionRunId,
    },
    /// A robot became available
    RobotAvailable(RobotAvailableArgs),
    /// Emergency button pressed
    EmergencyButtonPressed {
        /// Robot to stop and send to a safe position
        robot_id: RobotId,
    },
    /// Emergency button released
    EmergencyButtonDepressed {
        /// Robot to release
        robot_id: RobotId,
    },
}

impl SchedulingEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SchedulingEvent::MissionRunCreated { .. } => EventKind::MissionRunCreated,
            SchedulingEvent::RobotAvailable(_) => EventKind::RobotAvailable,
            SchedulingEvent::EmergencyButtonPressed { .. } => EventKind::EmergencyButtonPressed,
            SchedulingEvent::EmergencyButtonDepressed { .. } => {
                EventKind::EmergencyButtonDepressed
            }
        }
    }

    /// Robot the event is about, when it names one directly.
    pub fn robot_id(&self) -> Option<&RobotId> {
        match self {
            SchedulingEvent::MissionRunCreated { .. } => None,
            SchedulingEvent::RobotAvailable(args) => Some(&args.robot_id),
            SchedulingEvent::EmergencyButtonPressed { robot_id }
            | SchedulingEvent::EmergencyButtonDepressed { robot_id } => Some(robot_id),
        }
    }
}

/// Envelope published on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event identifier
    pub event_id: String,
    /// Timestamp (Unix epoch milliseconds)
    pub timestamp: u64,
    /// Component that published the event
    pub source: String,
    /// The event itself
    pub event: SchedulingEvent,
}

impl EventEnvelope {
    /// Kind of the wrapped event.
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// Builder for event envelopes.
pub struct EventBuilder {
    envelope: EventEnvelope,
}

impl EventBuilder {
    /// Create a new event builder.
    pub fn new(event: SchedulingEvent, source: impl Into<String>) -> Self {
        Self {
            envelope: EventEnvelope {
                event_id: uuid::Uuid::new_v4().to_string(),
                timestamp: current_timestamp_ms(),
                source: source.into(),
                event,
            },
        }
    }

    /// Build the envelope.
    pub fn build(self) -> EventEnvelope {
        self.envelope
    }
}

/// Standard event type names.
pub mod event_types {
    pub const MISSION_RUN_CREATED: &str = "mission_run.created";
    pub const ROBOT_AVAILABLE: &str = "robot.available";
    pub const EMERGENCY_BUTTON_PRESSED: &str = "emergency.button_pressed";
    pub const EMERGENCY_BUTTON_DEPRESSED: &str = "emergency.button_depressed";
}

//! Areas and safe positions

use flotilla_core::AreaId;
use serde::{Deserialize, Serialize};

/// Position in the area's local frame (meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared euclidean distance; enough for nearest-neighbour comparisons
    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Predefined fallback destination inside an area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafePosition {
    pub name: String,
    pub position: Position,
}

/// Area record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub name: String,
    #[serde(default)]
    pub safe_positions: Vec<SafePosition>,
}

impl Area {
    pub fn new(id: AreaId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            safe_positions: Vec::new(),
        }
    }

    pub fn with_safe_position(mut self, name: impl Into<String>, position: Position) -> Self {
        self.safe_positions.push(SafePosition {
            name: name.into(),
            position,
        });
        self
    }

    /// Safe position closest to `from`; the first configured one when the
    /// robot pose is unknown.
    pub fn nearest_safe_position(&self, from: Option<&Position>) -> Option<&SafePosition> {
        match from {
            None => self.safe_positions.first(),
            Some(pose) => self.safe_positions.iter().min_by(|a, b| {
                a.position
                    .distance_squared(pose)
                    .total_cmp(&b.position.distance_squared(pose))
            }),
        }
    }
}

//! Node configuration: the shared sections plus the fleet to seed.

use std::path::Path;

use anyhow::Context;
use flotilla_core::{AreaId, Config, RobotId};
use flotilla_domain::{Area, Position, Robot};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeServiceConfig {
    #[serde(flatten)]
    pub base: Config,
    #[serde(default)]
    pub fleet: FleetConfig,
}

/// Robots and areas loaded into the in-memory directories at startup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub robots: Vec<RobotSeed>,
    #[serde(default)]
    pub areas: Vec<Area>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RobotSeed {
    pub id: RobotId,
    pub name: String,
    pub model: String,
    pub area: Option<AreaId>,
    pub pose: Option<Position>,
}

impl RobotSeed {
    pub fn to_robot(&self) -> Robot {
        let mut robot = Robot::new(self.id.clone(), self.name.clone(), self.model.clone());
        robot.current_area = self.area.clone();
        robot.pose = self.pose;
        robot
    }
}

impl NodeServiceConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: NodeServiceConfig = toml::from_str(raw)?;
        config.base.validate()?;
        config.validate_fleet()?;
        Ok(config)
    }

    fn validate_fleet(&self) -> anyhow::Result<()> {
        for seed in &self.fleet.robots {
            if let Some(area_id) = &seed.area {
                anyhow::ensure!(
                    self.fleet.areas.iter().any(|area| &area.id == area_id),
                    "robot {} references unknown area {}",
                    seed.id,
                    area_id
                );
            }
        }
        Ok(())
    }
}

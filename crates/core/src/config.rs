//! Configuration management for Flotilla.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};

/// Default number of pending runs read per queue decision.
pub const DEFAULT_QUEUE_PAGE_SIZE: usize = 100;

/// Default cap on consecutive chained RobotAvailable events per robot.
pub const DEFAULT_MAX_TRIGGER_CHAIN: u32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node-001".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Page size of every mission run queue read. Runs past the page wait
    /// for a later pass.
    pub queue_page_size: usize,
    /// Consecutive chained RobotAvailable events tolerated for one robot
    /// before the chain is dropped.
    pub max_trigger_chain: u32,
    /// Raise RobotAvailable after the safe-position run could not be
    /// scheduled and the queue was unfrozen.
    pub raise_available_after_safe_zone_failure: bool,
    /// Capacity of the event bus.
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_page_size: DEFAULT_QUEUE_PAGE_SIZE,
            max_trigger_chain: DEFAULT_MAX_TRIGGER_CHAIN,
            raise_available_after_safe_zone_failure: true,
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            node: NodeConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.node_id.trim().is_empty() {
            return Err(CoreError::InvalidConfig("node.node_id is empty".to_string()));
        }
        if self.scheduler.queue_page_size == 0 {
            return Err(CoreError::InvalidConfig(
                "scheduler.queue_page_size must be at least 1".to_string(),
            ));
        }
        if self.scheduler.max_trigger_chain == 0 {
            return Err(CoreError::InvalidConfig(
                "scheduler.max_trigger_chain must be at least 1".to_string(),
            ));
        }
        if self.scheduler.event_buffer == 0 {
            return Err(CoreError::InvalidConfig(
                "scheduler.event_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

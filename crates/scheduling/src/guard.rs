//! Re-trigger chain guard
//!
//! The scheduler re-raises RobotAvailable as a chained event after a failed
//! start. A robot whose starts keep failing would otherwise spin through
//! chained events. The guard counts consecutive chained events per robot and
//! suppresses the chain once it exceeds the configured length. A fresh
//! external event or a successful start resets the count.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use flotilla_core::{RobotAvailableArgs, RobotId, TriggerOrigin};

/// Verdict for one RobotAvailable event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDecision {
    /// Handle the event; `depth` chained events in a row so far
    Admit { depth: u32 },
    /// Drop the event; the chain is `depth` long
    Suppress { depth: u32 },
}

#[derive(Debug)]
pub struct ChainGuard {
    max_chain: u32,
    depths: Mutex<HashMap<RobotId, u32>>,
}

impl ChainGuard {
    pub fn new(max_chain: u32) -> Self {
        Self {
            max_chain,
            depths: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_chain(&self) -> u32 {
        self.max_chain
    }

    /// Count the event and decide whether to handle it
    pub fn admit(&self, args: &RobotAvailableArgs) -> ChainDecision {
        let mut depths = self.depths();
        match args.origin {
            TriggerOrigin::External => {
                depths.remove(&args.robot_id);
                ChainDecision::Admit { depth: 0 }
            }
            TriggerOrigin::Chained => {
                let depth = depths.entry(args.robot_id.clone()).or_insert(0);
                *depth = depth.saturating_add(1);
                if *depth > self.max_chain {
                    ChainDecision::Suppress { depth: *depth }
                } else {
                    ChainDecision::Admit { depth: *depth }
                }
            }
        }
    }

    /// A run started on the robot; the chain did its job
    pub fn record_start(&self, robot_id: &RobotId) {
        self.depths().remove(robot_id);
    }

    /// Current chain length for the robot
    pub fn depth(&self, robot_id: &RobotId) -> u32 {
        self.depths().get(robot_id).copied().unwrap_or(0)
    }

    fn depths(&self) -> MutexGuard<'_, HashMap<RobotId, u32>> {
        self.depths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! Per-robot mission run queue and the selection rule
//!
//! The queue is never stored. It is read fresh from the mission store for
//! every decision, already ordered by desired start time. Selection filters
//! and never reorders: a frozen queue only yields emergency runs.

use crate::mission::MissionRun;
use crate::robot::Robot;

/// Pending runs of one robot, ordered by desired start time
#[derive(Debug, Clone, PartialEq)]
pub struct MissionRunQueue {
    runs: Vec<MissionRun>,
    page_size: usize,
}

impl MissionRunQueue {
    /// Wrap the result of a pending-queue read
    pub fn new(runs: Vec<MissionRun>, page_size: usize) -> Self {
        Self { runs, page_size }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// The read filled its page, so more pending runs may exist
    pub fn is_at_capacity(&self) -> bool {
        self.runs.len() >= self.page_size
    }

    /// Next run to dispatch for `robot`
    pub fn next_for(&self, robot: &Robot) -> Option<&MissionRun> {
        self.runs.iter().find(|run| {
            run.robot_id == robot.id && (!robot.mission_queue_frozen || run.is_emergency())
        })
    }
}

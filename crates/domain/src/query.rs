//! Mission run queries
//!
//! Filter, order and page description understood by every mission store.
//! [`MissionRunQuery::apply`] is the reference evaluation; stores backed by
//! something other than memory must return the same rows in the same order.

use flotilla_core::RobotId;
use serde::{Deserialize, Serialize};

use crate::mission::{MissionRun, MissionStatus};

/// Sort key of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissionRunOrder {
    /// Earliest desired start time first; ties broken by run id
    #[default]
    DesiredStartTime,
}

/// Mission run query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRunQuery {
    /// Accepted statuses; empty accepts all
    pub statuses: Vec<MissionStatus>,
    /// Owning robot filter
    pub robot_id: Option<RobotId>,
    /// Sort key
    pub order_by: MissionRunOrder,
    /// Maximum number of rows returned
    pub page_size: usize,
}

impl MissionRunQuery {
    /// Pending runs of one robot, earliest desired start first
    pub fn pending_queue(robot_id: RobotId, page_size: usize) -> Self {
        Self {
            statuses: vec![MissionStatus::Pending],
            robot_id: Some(robot_id),
            order_by: MissionRunOrder::DesiredStartTime,
            page_size,
        }
    }

    /// Runs of one robot that are executing or paused
    pub fn ongoing(robot_id: RobotId, page_size: usize) -> Self {
        Self {
            statuses: MissionStatus::ALL
                .into_iter()
                .filter(MissionStatus::is_ongoing)
                .collect(),
            robot_id: Some(robot_id),
            order_by: MissionRunOrder::DesiredStartTime,
            page_size,
        }
    }

    pub fn matches(&self, run: &MissionRun) -> bool {
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&run.status);
        let robot_ok = self
            .robot_id
            .as_ref()
            .map_or(true, |robot_id| &run.robot_id == robot_id);
        status_ok && robot_ok
    }

    /// Evaluate the query over an in-memory collection
    pub fn apply<'a, I>(&self, runs: I) -> Vec<MissionRun>
    where
        I: IntoIterator<Item = &'a MissionRun>,
    {
        let mut selected: Vec<MissionRun> =
            runs.into_iter().filter(|r| self.matches(r)).cloned().collect();

        match self.order_by {
            MissionRunOrder::DesiredStartTime => selected.sort_by(|a, b| {
                a.desired_start_time
                    .cmp(&b.desired_start_time)
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }

        selected.truncate(self.page_size);
        selected
    }
}

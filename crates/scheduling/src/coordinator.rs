//! Event coordinator
//!
//! Subscribes to the scheduling events on the bus and turns each one into
//! scheduler calls. Every event is handled on its own task. Start decisions
//! go through the [`SchedulingLock`]; everything else runs unlocked, so the
//! scheduler re-validates whatever the coordinator read beforehand.
//!
//! Handlers never return errors to the event source. Faults are logged and
//! summarized in the returned [`HandlerOutcome`].
//!
//! When the listener falls behind the bus, the overwritten events are gone.
//! The coordinator then offers every robot its queue again, which covers
//! lost MissionRunCreated and RobotAvailable events. A lost emergency press
//! or release cannot be rebuilt and is only visible in the log.

use std::sync::{Arc, Mutex, MutexGuard};

use flotilla_core::{
    EventEnvelope, EventKind, MissionRunId, RobotAvailableArgs, RobotId, SchedulerConfig,
    SchedulingEvent,
};
use flotilla_domain::{MissionRun, MissionRunQuery, MissionRunQueue};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::error::{BusError, Result, SchedulingError};
use crate::guard::{ChainDecision, ChainGuard};
use crate::lock::SchedulingLock;
use crate::scheduler::{MissionScheduler, StartOutcome};
use crate::store::{AreaDirectory, MissionRunStore, RobotDirectory};

/// Why a handler did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// The robot has no pending runs
    EmptyQueue,
    /// Pending runs exist but none may be dispatched (frozen queue)
    NoEligibleRun,
}

/// Summary of what one handler invocation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// A start was attempted under the scheduling lock
    StartAttempted {
        mission_run_id: MissionRunId,
        outcome: StartOutcome,
    },
    /// The start attempt raised a fault
    StartFailed {
        mission_run_id: MissionRunId,
        error: String,
    },
    /// Nothing to do
    Idle(IdleReason),
    /// The handler stopped early
    Aborted { reason: String },
    /// A chained RobotAvailable was dropped
    Suppressed { robot_id: RobotId, depth: u32 },
    /// Emergency press handled
    EmergencyStopped {
        /// Safe-position run created, if any
        safe_position_run: Option<MissionRunId>,
        robot_available_raised: bool,
    },
    /// Emergency release handled
    EmergencyReleased { ongoing_mission: bool },
}

struct Listener {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Listener {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Routes scheduling events to the mission scheduler.
///
/// Clones share the same collaborators, lock, guard and listener.
#[derive(Clone)]
pub struct EventCoordinator {
    scheduler: Arc<dyn MissionScheduler>,
    missions: Arc<dyn MissionRunStore>,
    robots: Arc<dyn RobotDirectory>,
    areas: Arc<dyn AreaDirectory>,
    events: EventBus,
    lock: SchedulingLock,
    guard: Arc<ChainGuard>,
    config: SchedulerConfig,
    listener: Arc<Mutex<Option<Listener>>>,
}

impl EventCoordinator {
    pub fn new(
        scheduler: Arc<dyn MissionScheduler>,
        missions: Arc<dyn MissionRunStore>,
        robots: Arc<dyn RobotDirectory>,
        areas: Arc<dyn AreaDirectory>,
        events: EventBus,
        lock: SchedulingLock,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            scheduler,
            missions,
            robots,
            areas,
            events,
            lock,
            guard: Arc::new(ChainGuard::new(config.max_trigger_chain)),
            config,
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribe to the bus and start handling events
    pub fn start(&self) -> Result<()> {
        let mut listener = self.listener();
        if listener.as_ref().is_some_and(Listener::is_alive) {
            return Err(SchedulingError::AlreadyRunning);
        }

        let mut subscription = self.events.subscribe(&EventKind::ALL);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let coordinator = self.clone();

        let handle = tokio::spawn(async move {
            let mut handlers = JoinSet::new();
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                        if let Err(e) = joined {
                            error!(error = %e, "Event handler task failed");
                        }
                    }
                    received = subscription.recv() => match received {
                        Ok(envelope) => {
                            let handler = coordinator.clone();
                            handlers.spawn(async move {
                                handler.handle(envelope).await;
                            });
                        }
                        Err(BusError::Lagged(skipped)) => {
                            error!(
                                skipped,
                                "Event listener lagged behind the bus, events were dropped"
                            );
                            let handler = coordinator.clone();
                            handlers.spawn(async move {
                                handler.recover_from_lag().await;
                            });
                        }
                        Err(BusError::Closed) => break,
                    },
                }
            }

            drop(subscription);
            while let Some(joined) = handlers.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Event handler task failed");
                }
            }
            debug!("Event listener stopped");
        });

        *listener = Some(Listener {
            shutdown: shutdown_tx,
            handle,
        });
        info!("Event coordinator started");
        Ok(())
    }

    /// Unsubscribe and wait for in-flight handlers to finish
    pub async fn stop(&self) {
        let listener = self.listener().take();
        let Some(Listener { shutdown, handle }) = listener else {
            return;
        };

        // The listener may already have exited if the bus closed.
        let _ = shutdown.send(());
        if let Err(e) = handle.await {
            error!(error = %e, "Event listener task failed");
        }
        info!("Event coordinator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.listener().as_ref().is_some_and(Listener::is_alive)
    }

    /// Handle one event
    pub async fn handle(&self, envelope: EventEnvelope) -> HandlerOutcome {
        debug!(
            event_id = %envelope.event_id,
            event_type = envelope.kind().as_str(),
            source = %envelope.source,
            "Handling event"
        );
        match envelope.event {
            SchedulingEvent::MissionRunCreated { mission_run_id } => {
                self.on_mission_run_created(&mission_run_id).await
            }
            SchedulingEvent::RobotAvailable(args) => self.on_robot_available(args).await,
            SchedulingEvent::EmergencyButtonPressed { robot_id } => {
                self.on_emergency_button_pressed(&robot_id).await
            }
            SchedulingEvent::EmergencyButtonDepressed { robot_id } => {
                self.on_emergency_button_depressed(&robot_id).await
            }
        }
    }

    pub async fn on_mission_run_created(&self, mission_run_id: &MissionRunId) -> HandlerOutcome {
        info!(mission_run_id = %mission_run_id, "Triggered MissionRunCreated");

        let mission_run = match self.missions.read_by_id(mission_run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => return aborted(format!("mission run {} not found", mission_run_id)),
            Err(e) => return aborted(format!("failed to read mission run {}: {}", mission_run_id, e)),
        };

        let queue = match self.mission_run_queue(&mission_run.robot_id).await {
            Ok(queue) => queue,
            Err(outcome) => return outcome,
        };
        if self.scheduler.mission_run_queue_is_empty(&queue) {
            info!(
                mission_run_id = %mission_run_id,
                "Mission run not started, there are no mission runs on the queue"
            );
            return HandlerOutcome::Idle(IdleReason::EmptyQueue);
        }

        self.start_under_lock(&mission_run).await
    }

    pub async fn on_robot_available(&self, args: RobotAvailableArgs) -> HandlerOutcome {
        let robot_id = args.robot_id.clone();
        info!(robot_id = %robot_id, origin = ?args.origin, "Triggered RobotAvailable");

        if let ChainDecision::Suppress { depth } = self.guard.admit(&args) {
            warn!(
                robot_id = %robot_id,
                depth,
                max_chain = self.guard.max_chain(),
                "Dropping chained RobotAvailable, too many in a row without a start"
            );
            return HandlerOutcome::Suppressed { robot_id, depth };
        }

        let robot = match self.robots.read_by_id(&robot_id).await {
            Ok(Some(robot)) => robot,
            Ok(None) => return aborted(format!("robot {} not found", robot_id)),
            Err(e) => return aborted(format!("failed to read robot {}: {}", robot_id, e)),
        };

        let queue = match self.mission_run_queue(&robot.id).await {
            Ok(queue) => queue,
            Err(outcome) => return outcome,
        };
        if self.scheduler.mission_run_queue_is_empty(&queue) {
            info!(
                robot_id = %robot_id,
                "Robot available but there are no mission runs in the queue"
            );
            return HandlerOutcome::Idle(IdleReason::EmptyQueue);
        }

        let Some(mission_run) = queue.next_for(&robot).cloned() else {
            info!(
                robot_id = %robot_id,
                frozen = robot.mission_queue_frozen,
                "Robot available but no mission run may be scheduled"
            );
            return HandlerOutcome::Idle(IdleReason::NoEligibleRun);
        };

        self.start_under_lock(&mission_run).await
    }

    pub async fn on_emergency_button_pressed(&self, robot_id: &RobotId) -> HandlerOutcome {
        info!(robot_id = %robot_id, "Triggered EmergencyButtonPressed");

        let robot = match self.robots.read_by_id(robot_id).await {
            Ok(Some(robot)) => robot,
            Ok(None) => return aborted(format!("robot {} not found", robot_id)),
            Err(e) => return aborted(format!("failed to read robot {}: {}", robot_id, e)),
        };
        let Some(area_id) = robot.current_area.clone() else {
            return aborted(format!("robot {} has no current area", robot_id));
        };
        let area = match self.areas.read_by_id(&area_id).await {
            Ok(Some(area)) => area,
            Ok(None) => return aborted(format!("area {} not found", area_id)),
            Err(e) => return aborted(format!("failed to read area {}: {}", area_id, e)),
        };

        if let Err(e) = self
            .scheduler
            .freeze_mission_run_queue_for_robot(robot_id)
            .await
        {
            return aborted(format!("failed to freeze queue: {}", e));
        }

        match self.scheduler.stop_current_mission_run(robot_id).await {
            Ok(()) => {}
            Err(SchedulingError::MissionRunNotFound(_)) => {
                debug!(robot_id = %robot_id, "No ongoing mission run to stop");
            }
            Err(e) if e.is_conflict() => {
                info!(
                    robot_id = %robot_id,
                    "Robot controller already idle, continuing to safe position"
                );
            }
            Err(e) => {
                return aborted(format!(
                    "failed to stop the current mission on robot {}: {}",
                    robot.name, e
                ));
            }
        }

        let safe_position_run = match self
            .scheduler
            .schedule_mission_to_return_to_safe_position(robot_id, &area.id)
            .await
        {
            Ok(run) => Some(run.id),
            Err(e @ SchedulingError::SafeZone { .. }) => {
                error!(
                    robot_id = %robot_id,
                    "Failed to schedule return to safe zone mission on robot {}: {}",
                    robot.name,
                    e
                );
                if let Err(e) = self
                    .scheduler
                    .unfreeze_mission_run_queue_for_robot(robot_id)
                    .await
                {
                    return aborted(format!("failed to unfreeze queue: {}", e));
                }
                if !self.config.raise_available_after_safe_zone_failure {
                    return HandlerOutcome::EmergencyStopped {
                        safe_position_run: None,
                        robot_available_raised: false,
                    };
                }
                None
            }
            Err(e) => return aborted(format!("failed to schedule safe position run: {}", e)),
        };

        self.scheduler
            .trigger_robot_available(RobotAvailableArgs::new(robot_id.clone()));
        HandlerOutcome::EmergencyStopped {
            safe_position_run,
            robot_available_raised: true,
        }
    }

    pub async fn on_emergency_button_depressed(&self, robot_id: &RobotId) -> HandlerOutcome {
        info!(robot_id = %robot_id, "Triggered EmergencyButtonDepressed");

        let robot = match self.robots.read_by_id(robot_id).await {
            Ok(Some(robot)) => robot,
            Ok(None) => return aborted(format!("robot {} not found", robot_id)),
            Err(e) => return aborted(format!("failed to read robot {}: {}", robot_id, e)),
        };
        match &robot.current_area {
            None => warn!(robot_id = %robot_id, "Robot has no current area"),
            Some(area_id) => match self.areas.read_by_id(area_id).await {
                Ok(Some(_)) => {}
                Ok(None) => error!(area_id = %area_id, "Could not find area"),
                Err(e) => error!(area_id = %area_id, error = %e, "Failed to read area"),
            },
        }

        if let Err(e) = self
            .scheduler
            .unfreeze_mission_run_queue_for_robot(robot_id)
            .await
        {
            return aborted(format!("failed to unfreeze queue: {}", e));
        }

        let ongoing_mission = match self.scheduler.ongoing_mission(robot_id).await {
            Ok(ongoing) => ongoing,
            Err(e) => {
                warn!(robot_id = %robot_id, error = %e, "Could not check for an ongoing mission");
                false
            }
        };
        if ongoing_mission {
            info!(
                robot_id = %robot_id,
                "Robot unfrozen, the ongoing mission completes before further missions start"
            );
        }

        self.scheduler
            .trigger_robot_available(RobotAvailableArgs::new(robot_id.clone()));
        HandlerOutcome::EmergencyReleased { ongoing_mission }
    }

    /// Offer every robot its queue again after the listener dropped events.
    ///
    /// Robots are handled here directly instead of through the bus, which
    /// has just shown it cannot keep up.
    pub async fn recover_from_lag(&self) -> Vec<HandlerOutcome> {
        let robots = match self.robots.read_all().await {
            Ok(robots) => robots,
            Err(e) => {
                error!(error = %e, "Failed to list robots after dropped events");
                return Vec::new();
            }
        };

        warn!(robots = robots.len(), "Offering every robot its queue after dropped events");
        let mut outcomes = Vec::with_capacity(robots.len());
        for robot in robots {
            outcomes.push(self.on_robot_available(RobotAvailableArgs::new(robot.id)).await);
        }
        outcomes
    }

    async fn mission_run_queue(
        &self,
        robot_id: &RobotId,
    ) -> std::result::Result<MissionRunQueue, HandlerOutcome> {
        let page_size = self.config.queue_page_size;
        let runs = self
            .missions
            .read_all(&MissionRunQuery::pending_queue(robot_id.clone(), page_size))
            .await
            .map_err(|e| aborted(format!("failed to read queue of robot {}: {}", robot_id, e)))?;

        let queue = MissionRunQueue::new(runs, page_size);
        if queue.is_at_capacity() {
            warn!(
                robot_id = %robot_id,
                page_size,
                "Mission run queue filled its page, later runs wait for a later pass"
            );
        }
        Ok(queue)
    }

    async fn start_under_lock(&self, mission_run: &MissionRun) -> HandlerOutcome {
        let result = {
            let _permit = self.lock.acquire().await;
            self.scheduler
                .start_mission_run_if_system_is_available(mission_run)
                .await
        };

        match result {
            Ok(outcome) => {
                if outcome == StartOutcome::Started {
                    self.guard.record_start(&mission_run.robot_id);
                }
                HandlerOutcome::StartAttempted {
                    mission_run_id: mission_run.id.clone(),
                    outcome,
                }
            }
            Err(e) => {
                error!(mission_run_id = %mission_run.id, error = %e, "Failed to start mission run");
                HandlerOutcome::StartFailed {
                    mission_run_id: mission_run.id.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    fn listener(&self) -> MutexGuard<'_, Option<Listener>> {
        self.listener.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn aborted(reason: String) -> HandlerOutcome {
    error!("{}", reason);
    HandlerOutcome::Aborted { reason }
}

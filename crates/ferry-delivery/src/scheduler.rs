//! Heartbeat and termination scheduler.
//!
//! Each run asks the planner what is due at `now`, sends termination notices
//! and removes those subscriptions, then sends heartbeats to the rest.

use crate::pipeline::DeliveryPipeline;
use chrono::{DateTime, Utc};
use ferry_core::heartbeat::DEFAULT_TERMINATION_CHECK_INTERVAL;
use ferry_core::HeartbeatPlanner;
use std::time::Duration;
use tracing::{info, warn};

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the sweep runs.
    pub sweep_interval: Duration,
    /// Minimum time between termination checks.
    pub termination_check_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            termination_check_interval: DEFAULT_TERMINATION_CHECK_INTERVAL,
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub terminated: usize,
    pub heartbeats: usize,
}

/// Drives heartbeat and termination notifications.
pub struct HeartbeatScheduler {
    pipeline: DeliveryPipeline,
    planner: HeartbeatPlanner,
    sweep_interval: Duration,
}

impl HeartbeatScheduler {
    /// Create a scheduler sharing the pipeline's heartbeat schedule.
    #[must_use]
    pub fn new(pipeline: DeliveryPipeline, config: &SchedulerConfig) -> Self {
        let planner = HeartbeatPlanner::with_termination_check_interval(
            pipeline.manager().heartbeats().clone(),
            config.termination_check_interval,
        );
        Self {
            pipeline,
            planner,
            sweep_interval: config.sweep_interval,
        }
    }

    /// Configured sweep interval.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Run one sweep at `now`. Notifications are queued, not awaited.
    pub fn run(&self, now: DateTime<Utc>) -> SweepReport {
        let manager = self.pipeline.manager();
        let plan = self.planner.plan(manager.list(), now);

        for subscription in &plan.terminate {
            info!(
                subscription = %subscription.id,
                name = %subscription.name,
                "Terminating subscription"
            );
            self.pipeline.notify_terminated(subscription, now);
            if let Err(e) = manager.remove(&subscription.id) {
                warn!(subscription = %subscription.id, error = %e, "Failed to remove terminated subscription");
            }
        }

        for subscription in &plan.heartbeat {
            self.pipeline.notify_heartbeat(subscription, now);
        }

        SweepReport {
            terminated: plan.terminate.len(),
            heartbeats: plan.heartbeat.len(),
        }
    }
}

impl std::fmt::Debug for HeartbeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatScheduler")
            .field("pipeline", &self.pipeline)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

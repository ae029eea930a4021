//! Heartbeat and termination planning.
//!
//! A periodic sweep decides which subscriptions have passed their
//! termination time and which are due a heartbeat. The planner only updates
//! the heartbeat schedule; sending notifications and removing subscriptions
//! is left to the caller.

use crate::cache::TimestampMap;
use crate::subscription::Subscription;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Default interval between termination checks (3 hours).
pub const DEFAULT_TERMINATION_CHECK_INTERVAL: Duration = Duration::from_secs(3 * 60 * 60);

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepPlan {
    /// Subscriptions past their termination time.
    pub terminate: Vec<Subscription>,
    /// Subscriptions due a heartbeat.
    pub heartbeat: Vec<Subscription>,
}

impl SweepPlan {
    /// Check whether nothing needs to be sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terminate.is_empty() && self.heartbeat.is_empty()
    }
}

/// Plans heartbeat and termination notifications.
pub struct HeartbeatPlanner {
    heartbeats: Arc<dyn TimestampMap>,
    termination_check_interval: TimeDelta,
    /// Node-local; checking more often than needed is harmless.
    next_termination_check: Mutex<Option<DateTime<Utc>>>,
}

impl HeartbeatPlanner {
    /// Create a planner over the shared heartbeat schedule.
    #[must_use]
    pub fn new(heartbeats: Arc<dyn TimestampMap>) -> Self {
        Self::with_termination_check_interval(heartbeats, DEFAULT_TERMINATION_CHECK_INTERVAL)
    }

    /// Create a planner with a custom termination check interval.
    #[must_use]
    pub fn with_termination_check_interval(
        heartbeats: Arc<dyn TimestampMap>,
        interval: Duration,
    ) -> Self {
        Self {
            heartbeats,
            termination_check_interval: to_delta(interval),
            next_termination_check: Mutex::new(None),
        }
    }

    /// Plan one sweep at `now`.
    ///
    /// Terminated subscriptions are left out of the heartbeat pass. A
    /// subscription seen for the first time gets its first heartbeat
    /// scheduled one interval ahead instead of receiving one right away.
    pub fn plan(&self, subscriptions: Vec<Subscription>, now: DateTime<Utc>) -> SweepPlan {
        let mut plan = SweepPlan::default();

        let remaining = if self.termination_check_due(now) {
            let (terminate, remaining): (Vec<_>, Vec<_>) = subscriptions
                .into_iter()
                .partition(|s| s.initial_termination_time.is_some_and(|t| now > t));
            self.schedule_termination_check(&remaining, now);
            plan.terminate = terminate;
            remaining
        } else {
            subscriptions
        };

        for subscription in remaining {
            let Some(interval) = subscription.heartbeat_interval else {
                continue;
            };
            if self.heartbeat_due(&subscription.id, to_delta(interval), now) {
                plan.heartbeat.push(subscription);
            }
        }

        if !plan.is_empty() {
            debug!(
                terminate = plan.terminate.len(),
                heartbeat = plan.heartbeat.len(),
                "Planned sweep"
            );
        }
        plan
    }

    fn termination_check_due(&self, now: DateTime<Utc>) -> bool {
        let next = self
            .next_termination_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        next.map_or(true, |at| now >= at)
    }

    /// The next check happens after the configured interval, or earlier if a
    /// remaining subscription terminates before that.
    fn schedule_termination_check(&self, remaining: &[Subscription], now: DateTime<Utc>) {
        let mut next = now
            .checked_add_signed(self.termination_check_interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Some(earliest) = remaining
            .iter()
            .filter_map(|s| s.initial_termination_time)
            .filter(|t| *t >= now)
            .min()
        {
            next = next.min(earliest);
        }
        trace!(next = %next, "Scheduled termination check");
        *self
            .next_termination_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(next);
    }

    fn heartbeat_due(&self, id: &str, interval: TimeDelta, now: DateTime<Utc>) -> bool {
        let next = now
            .checked_add_signed(interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut due = false;
        self.heartbeats.compute(id, &mut |scheduled| match scheduled {
            Some(at) if at >= now => Some(at),
            previous => {
                // No previous entry means the subscription is new
                due = previous.is_some();
                Some(next)
            }
        });
        due
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

impl std::fmt::Debug for HeartbeatPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatPlanner")
            .field("scheduled", &self.heartbeats.len())
            .field("termination_check_interval", &self.termination_check_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalTimestampMap;

    fn planner() -> HeartbeatPlanner {
        HeartbeatPlanner::new(Arc::new(LocalTimestampMap::new()))
    }

    fn subscription(id: &str) -> Subscription {
        let mut s = Subscription::new(id, "http://localhost/push").with_codespace("NSB");
        s.id = id.to_string();
        s
    }

    #[test]
    fn test_heartbeat_schedule() {
        let planner = planner();
        let t = Utc::now();
        let subscriptions = vec![subscription("a").with_heartbeat(Duration::from_secs(60))];

        let at = |secs| planner.plan(subscriptions.clone(), t + TimeDelta::seconds(secs));

        assert!(at(0).heartbeat.is_empty());
        assert!(at(30).heartbeat.is_empty());
        assert_eq!(at(61).heartbeat.len(), 1);
        assert!(at(62).heartbeat.is_empty());
        assert_eq!(at(122).heartbeat.len(), 1);
    }

    #[test]
    fn test_no_interval_no_heartbeat() {
        let planner = planner();
        let t = Utc::now();

        for secs in [0, 61, 122] {
            let plan = planner.plan(vec![subscription("a")], t + TimeDelta::seconds(secs));
            assert!(plan.is_empty());
        }
    }

    #[test]
    fn test_termination() {
        let planner = planner();
        let t = Utc::now();
        let terminating = subscription("a")
            .with_heartbeat(Duration::from_secs(60))
            .terminating_at(t + TimeDelta::hours(1));

        assert!(planner.plan(vec![terminating.clone()], t).terminate.is_empty());
        assert!(planner
            .plan(vec![terminating.clone()], t + TimeDelta::minutes(30))
            .terminate
            .is_empty());

        let plan = planner.plan(vec![terminating], t + TimeDelta::minutes(61));
        assert_eq!(plan.terminate.len(), 1);
        assert!(plan.heartbeat.is_empty());
    }

    #[test]
    fn test_termination_check_is_throttled() {
        let planner = planner();
        let t = Utc::now();

        assert!(planner.plan(vec![subscription("a")], t).is_empty());

        // Added after the last check and already expired
        let expired = subscription("b").terminating_at(t - TimeDelta::minutes(1));
        assert!(planner
            .plan(vec![expired.clone()], t + TimeDelta::hours(1))
            .terminate
            .is_empty());
        assert_eq!(
            planner
                .plan(vec![expired], t + TimeDelta::hours(3))
                .terminate
                .len(),
            1
        );
    }
}

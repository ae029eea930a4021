//! Delivery instrumentation.
//!
//! Records through the `metrics` facade; whichever recorder the binary
//! installs (Prometheus in `ferry-server`) picks these up.

use metrics::{counter, gauge, histogram};

/// Metric names.
pub mod names {
    pub const PUSHES_TOTAL: &str = "ferry_pushes_total";
    pub const PUSH_DURATION_SECONDS: &str = "ferry_push_duration_seconds";
    pub const PUSH_QUEUE: &str = "ferry_push_queue";
    pub const PUSHES_ACTIVE: &str = "ferry_pushes_active";
    pub const NOTIFICATIONS_TOTAL: &str = "ferry_notifications_total";
    pub const SUBSCRIPTIONS_REMOVED_TOTAL: &str = "ferry_subscriptions_removed_total";
}

/// Record the outcome of one push.
pub fn record_push(outcome: &str, seconds: f64) {
    counter!(names::PUSHES_TOTAL, "outcome" => outcome.to_string()).increment(1);
    histogram!(names::PUSH_DURATION_SECONDS).record(seconds);
}

/// Record a heartbeat or termination notice.
pub fn record_notification(kind: &str) {
    counter!(names::NOTIFICATIONS_TOTAL, "type" => kind.to_string()).increment(1);
}

/// Record a subscription removed by the delivery side.
pub fn record_removal(reason: &str) {
    counter!(names::SUBSCRIPTIONS_REMOVED_TOTAL, "reason" => reason.to_string()).increment(1);
}

/// Update the pool gauges.
pub fn set_pool_depth(active: usize, queued: usize) {
    gauge!(names::PUSHES_ACTIVE).set(active as f64);
    gauge!(names::PUSH_QUEUE).set(queued as f64);
}

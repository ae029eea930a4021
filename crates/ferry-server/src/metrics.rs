//! Metrics export for Ferry.
//!
//! The library crates record through the `metrics` facade; this module
//! describes those series and exports them in Prometheus format.

use anyhow::{Context, Result};
use ferry_delivery::metrics::names as delivery;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names owned by the server.
pub mod names {
    pub const EVENTS_TOTAL: &str = "ferry_events_total";
    pub const EVENTS_REJECTED_TOTAL: &str = "ferry_events_rejected_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::EVENTS_TOTAL, "Total number of events received");
    metrics::describe_counter!(
        names::EVENTS_REJECTED_TOTAL,
        "Total number of malformed events dropped"
    );
    metrics::describe_counter!(delivery::PUSHES_TOTAL, "Total number of event pushes by outcome");
    metrics::describe_histogram!(
        delivery::PUSH_DURATION_SECONDS,
        "Event push duration in seconds"
    );
    metrics::describe_gauge!(delivery::PUSH_QUEUE, "Pushes waiting for a worker");
    metrics::describe_gauge!(delivery::PUSHES_ACTIVE, "Pushes in progress");
    metrics::describe_counter!(
        delivery::NOTIFICATIONS_TOTAL,
        "Total number of heartbeat and termination notifications"
    );
    metrics::describe_counter!(
        delivery::SUBSCRIPTIONS_REMOVED_TOTAL,
        "Total number of subscriptions removed by delivery"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a received event.
pub fn record_event(kind: &str) {
    counter!(names::EVENTS_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Record a dropped malformed event.
pub fn record_rejected(kind: &str) {
    counter!(names::EVENTS_REJECTED_TOTAL, "kind" => kind.to_string()).increment(1);
}

//! Delivery pipeline.
//!
//! Turns routed events and scheduler notices into posts on the worker pool
//! and feeds every event push answer back into the subscription lifecycle:
//!
//! | Answer                 | Effect                                     |
//! |------------------------|--------------------------------------------|
//! | 200                    | failed push counter reset                  |
//! | 205                    | subscription removed                       |
//! | anything else, error   | counter incremented, removed past the limit |
//!
//! Heartbeats and termination notices are best effort and never touch the
//! counter.

use crate::metrics;
use crate::pool::{PoolConfig, PushPool, DEFAULT_WORKERS};
use crate::traits::{PushOutcome, Transport, TransportError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use ferry_core::manager::DEFAULT_MAX_FAILED_PUSHES;
use ferry_core::{Outgoing, PushFailure, Subscription, SubscriptionManager};
use ferry_model::{codec, Envelope, Event, CONTENT_TYPE};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Delivery configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Maximum number of pushes in progress at once.
    pub workers: usize,
    /// Per-request timeout for the HTTP transport.
    pub request_timeout: Duration,
    /// Consecutive failed pushes tolerated before a subscription is removed.
    pub max_failed_pushes: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            request_timeout: Duration::from_secs(10),
            max_failed_pushes: DEFAULT_MAX_FAILED_PUSHES,
        }
    }
}

/// Fire-and-forget push delivery.
#[derive(Clone)]
pub struct DeliveryPipeline {
    manager: SubscriptionManager,
    transport: Arc<dyn Transport>,
    pool: PushPool,
    node: Arc<str>,
}

impl DeliveryPipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        manager: SubscriptionManager,
        transport: Arc<dyn Transport>,
        config: &DeliveryConfig,
    ) -> Self {
        let node: Arc<str> = node_name().into();
        info!(
            node = %node,
            transport = transport.name(),
            workers = config.workers,
            "Starting delivery pipeline"
        );
        Self {
            manager: manager.with_max_failed_pushes(config.max_failed_pushes),
            transport,
            pool: PushPool::new(PoolConfig {
                workers: config.workers,
            }),
            node,
        }
    }

    /// The subscription manager push answers are reported to.
    #[must_use]
    pub fn manager(&self) -> &SubscriptionManager {
        &self.manager
    }

    /// The worker pool.
    #[must_use]
    pub fn pool(&self) -> &PushPool {
        &self.pool
    }

    /// Name of this node.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Queue a push of a routed event.
    pub fn notify(&self, outgoing: Outgoing) {
        let manager = self.manager.clone();
        let transport = Arc::clone(&self.transport);
        self.pool.spawn(async move {
            push_event(&manager, transport.as_ref(), outgoing).await;
        });
    }

    /// Queue pushes for every routed event, returning how many were queued.
    pub fn notify_all(&self, outgoing: Vec<Outgoing>) -> usize {
        let count = outgoing.len();
        for push in outgoing {
            self.notify(push);
        }
        count
    }

    /// Queue a heartbeat notification.
    pub fn notify_heartbeat(&self, subscription: &Subscription, now: DateTime<Utc>) {
        let envelope = Envelope::heartbeat(Some(subscription.name.clone()), now);
        self.notify_envelope(subscription, envelope, "heartbeat");
    }

    /// Queue a subscription-terminated notification.
    pub fn notify_terminated(&self, subscription: &Subscription, now: DateTime<Utc>) {
        let envelope = Envelope::terminated(
            subscription.requestor_ref.clone(),
            subscription.client_subscription_ref.clone(),
            now,
        );
        self.notify_envelope(subscription, envelope, "terminated");
    }

    /// Wait until every queued push has finished.
    pub async fn drained(&self) {
        self.pool.drained().await;
    }

    fn notify_envelope(&self, subscription: &Subscription, envelope: Envelope, kind: &'static str) {
        let transport = Arc::clone(&self.transport);
        let id = subscription.id.clone();
        let url = subscription.push_address.clone();
        self.pool.spawn(async move {
            let result = match codec::encode(&envelope) {
                Ok(body) => transport.post(&url, CONTENT_TYPE, body).await,
                Err(e) => Err(e.into()),
            };
            metrics::record_notification(kind);
            match result {
                Ok(status) => info!(subscription = %id, status, "Sent {} notification", kind),
                Err(e) => warn!(subscription = %id, error = %e, "Failed to send {} notification", kind),
            }
        });
    }
}

impl std::fmt::Debug for DeliveryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryPipeline")
            .field("node", &self.node)
            .field("transport", &self.transport.name())
            .field("pool", &self.pool)
            .finish()
    }
}

/// Address and body of an event push.
///
/// Enveloped subscribers get a service delivery at their address; legacy
/// subscribers get the bare event at their address plus `/sx` or `/et`.
fn payload(subscription: &Subscription, event: Event) -> Result<(String, Bytes), TransportError> {
    if subscription.enveloped {
        let body = codec::encode(&Envelope::service_delivery(event, Utc::now()))?;
        return Ok((subscription.push_address.clone(), body));
    }

    let url = format!(
        "{}{}",
        subscription.push_address.trim_end_matches('/'),
        event.kind().legacy_suffix()
    );
    let body = match &event {
        Event::Situation(sx) => codec::encode(sx)?,
        Event::VehicleJourney(et) => codec::encode(et)?,
    };
    Ok((url, body))
}

async fn push_event(manager: &SubscriptionManager, transport: &dyn Transport, outgoing: Outgoing) {
    let Outgoing {
        subscription,
        event,
    } = outgoing;
    let kind = event.kind();
    let start = Instant::now();

    let result = match payload(&subscription, event) {
        Ok((url, body)) => {
            debug!(subscription = %subscription.id, url = %url, kind = %kind, "Pushing");
            transport.post(&url, CONTENT_TYPE, body).await
        }
        Err(e) => Err(e),
    };

    let outcome = PushOutcome::from_result(&result);
    metrics::record_push(outcome.as_str(), start.elapsed().as_secs_f64());

    let id = &subscription.id;
    match outcome {
        PushOutcome::Delivered => {
            if let Err(e) = manager.record_push_success(id) {
                warn!(subscription = %id, error = %e, "Failed to reset failed push counter");
            }
        }
        PushOutcome::Reset => {
            info!(subscription = %id, "Receiver answered 205, removing subscription");
            match manager.remove(id) {
                Ok(_) => metrics::record_removal("reset"),
                Err(e) => warn!(subscription = %id, error = %e, "Failed to remove subscription"),
            }
        }
        PushOutcome::Failed(status) => {
            match (&result, status) {
                (Err(e), _) => warn!(subscription = %id, error = %e, "Push failed"),
                (_, Some(status)) => info!(subscription = %id, status, "Unexpected push response"),
                _ => {}
            }
            match manager.record_push_failure(id) {
                Ok(PushFailure::Counted(count)) => {
                    info!(subscription = %id, failures = count, "Increased failed push counter");
                }
                Ok(PushFailure::Removed(_)) => metrics::record_removal("failed_pushes"),
                Ok(PushFailure::Unknown) => {
                    debug!(subscription = %id, "Subscription already removed");
                }
                Err(e) => warn!(subscription = %id, error = %e, "Failed to record failed push"),
            }
        }
    }
}

/// Hostname of this node, or a random name if it cannot be read.
fn node_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("random_{}", Uuid::new_v4().as_u128() % 10_000))
}

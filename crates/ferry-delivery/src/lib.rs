//! # ferry-delivery
//!
//! Push delivery for the Ferry notification router.
//!
//! Routed events leave Ferry through this crate:
//!
//! - **Transport** - Posts an encoded payload and reports the status code
//! - **Pool** - Bounded set of push workers with a drain wait
//! - **Pipeline** - Addressing, envelopes and the push answer state machine
//! - **Scheduler** - Heartbeat and termination notifications
//!
//! ## Example
//!
//! ```rust,ignore
//! use ferry_delivery::{DeliveryConfig, DeliveryPipeline, HttpTransport};
//!
//! let pipeline = DeliveryPipeline::new(manager, Arc::new(HttpTransport::new()?), &DeliveryConfig::default());
//! pipeline.notify_all(router.route(&event, Utc::now())?);
//! pipeline.drained().await;
//! ```

pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod scheduler;
pub mod traits;

#[cfg(feature = "http")]
pub mod http;

#[cfg(test)]
mod testing;

pub use pipeline::{DeliveryConfig, DeliveryPipeline};
pub use pool::{PoolConfig, PushPool};
pub use scheduler::{HeartbeatScheduler, SchedulerConfig, SweepReport};
pub use traits::{PushOutcome, Transport, TransportError};

#[cfg(feature = "http")]
pub use http::HttpTransport;

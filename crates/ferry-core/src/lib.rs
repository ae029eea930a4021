//! # ferry-core
//!
//! Subscription matching, trimming and deduplication for the Ferry
//! notification router.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Subscription** - Criteria and delivery settings of one subscriber
//! - **Store** - Concurrent subscription storage with stop/line/codespace indexes
//! - **Matcher** - Directional stop matching and multi-criteria selection
//! - **Trim** - Per-subscription reduction of an event
//! - **Dedup** - Fingerprint cache suppressing repeated pushes
//! - **Router** - Select, trim and dedup one event into outgoing pushes
//! - **Heartbeat** - Heartbeat and termination planning
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Event    │────▶│   Router    │────▶│  Outgoing   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                      │     │     │
//!                      ▼     ▼     ▼
//!              ┌─────────┐ ┌──────┐ ┌─────────┐
//!              │ Matcher │ │ Trim │ │  Dedup  │
//!              └─────────┘ └──────┘ └─────────┘
//!                   │
//!                   ▼
//!   ┌───────┐ ┌──────────┐ ┌────────────┐
//!   │ Store │ │ Topology │ │ Live route │
//!   └───────┘ └──────────┘ └────────────┘
//! ```

pub mod cache;
pub mod dedup;
pub mod heartbeat;
pub mod live_route;
pub mod manager;
pub mod matching;
pub mod router;
pub mod store;
pub mod subscription;
pub mod topology;
pub mod trim;

pub use cache::{LocalTimestampMap, TimestampMap};
pub use dedup::DedupCache;
pub use heartbeat::{HeartbeatPlanner, SweepPlan};
pub use live_route::{InMemoryLiveRoutes, LiveRouteSource, NoLiveRoutes};
pub use manager::{PushFailure, SubscriptionManager};
pub use matching::Matcher;
pub use router::{Outgoing, RouteError, Router, RouterConfig};
pub use store::{InMemoryStore, StoreError, SubscriptionStore};
pub use subscription::{Subscription, SubscriptionError, SubscriptionId};
pub use topology::{NoTopology, StaticTopology, TopologyResolver};
pub use trim::{trim_situation, trim_vehicle_journey};

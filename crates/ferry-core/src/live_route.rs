//! Live route lookups.
//!
//! The live route of a vehicle journey is its current canonical stop
//! sequence. Situation updates often list only part of a journey, so
//! directional matching consults the live route for the full order.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ferry_model::VehicleJourneyUpdate;
use tracing::trace;

/// Source of current stop sequences for in-progress journeys.
pub trait LiveRouteSource: Send + Sync {
    /// Ordered stop sequence of the journey, or `None` if unknown.
    fn current_stop_sequence(&self, vehicle_journey_ref: &str) -> Option<Vec<String>>;
}

/// Source that knows no journeys.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLiveRoutes;

impl LiveRouteSource for NoLiveRoutes {
    fn current_stop_sequence(&self, _vehicle_journey_ref: &str) -> Option<Vec<String>> {
        None
    }
}

#[derive(Debug, Clone)]
struct LiveRoute {
    stops: Vec<String>,
    seen: DateTime<Utc>,
}

/// Live routes kept in memory, refreshed from vehicle journey updates.
#[derive(Debug, Default)]
pub struct InMemoryLiveRoutes {
    routes: DashMap<String, LiveRoute>,
}

impl InMemoryLiveRoutes {
    /// Create an empty route table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stop sequence of a journey.
    pub fn insert<I, S>(&self, vehicle_journey_ref: impl Into<String>, stops: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes.insert(
            vehicle_journey_ref.into(),
            LiveRoute {
                stops: stops.into_iter().map(Into::into).collect(),
                seen: now,
            },
        );
    }

    /// Refresh the routes of the journey references an update carries.
    ///
    /// Only an update flagged as the complete stop sequence replaces a
    /// route. Any other update just marks the known routes as seen at `now`.
    pub fn update(&self, journey: &VehicleJourneyUpdate, now: DateTime<Utc>) {
        if journey.is_complete_stop_sequence != Some(true) {
            for journey_ref in journey.journey_refs() {
                if let Some(mut route) = self.routes.get_mut(journey_ref) {
                    route.seen = now;
                }
            }
            return;
        }

        let stops: Vec<String> = journey.stop_sequence().map(str::to_string).collect();
        if stops.is_empty() {
            return;
        }
        for journey_ref in journey.journey_refs() {
            trace!(journey = %journey_ref, stops = stops.len(), "Refreshed live route");
            self.insert(journey_ref, stops.iter().cloned(), now);
        }
    }

    /// Forget a journey.
    pub fn remove(&self, vehicle_journey_ref: &str) {
        self.routes.remove(vehicle_journey_ref);
    }

    /// Drop routes not seen since `cutoff`, returning how many were removed.
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.routes.len();
        self.routes.retain(|_, route| route.seen >= cutoff);
        let removed = before.saturating_sub(self.routes.len());
        trace!(removed, remaining = self.routes.len(), "Evicted live routes");
        removed
    }

    /// Number of known journeys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check whether no journeys are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl LiveRouteSource for InMemoryLiveRoutes {
    fn current_stop_sequence(&self, vehicle_journey_ref: &str) -> Option<Vec<String>> {
        self.routes.get(vehicle_journey_ref).map(|r| r.stops.clone())
    }
}

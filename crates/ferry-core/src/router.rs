//! Event router for Ferry.
//!
//! The router turns one inbound event into the pushes it causes: it selects
//! the affected subscriptions, trims a copy of the event for each of them and
//! drops the copies already sent. Routing runs synchronously on the caller;
//! the resulting pushes are handed to the delivery pipeline.

use crate::cache::TimestampMap;
use crate::dedup::{DedupCache, DEFAULT_TTL};
use crate::live_route::LiveRouteSource;
use crate::matching::Matcher;
use crate::store::SubscriptionStore;
use crate::subscription::Subscription;
use crate::topology::TopologyResolver;
use crate::trim::{trim_situation, trim_vehicle_journey};
use chrono::{DateTime, Utc};
use ferry_model::Event;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Situation without a situation number.
    #[error("Situation has no situation number")]
    MissingSituationNumber,

    /// Vehicle journey without line, vehicle or dated journey reference.
    #[error("Vehicle journey has no line, vehicle or dated vehicle journey reference")]
    MissingJourneyIdentity,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// How long a sent fingerprint suppresses identical pushes.
    pub dedup_ttl: Duration,
    /// Producers whose events are routed. Empty accepts every producer.
    pub accepted_producers: BTreeSet<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            dedup_ttl: DEFAULT_TTL,
            accepted_producers: BTreeSet::new(),
        }
    }
}

/// A trimmed event bound for one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub subscription: Subscription,
    pub event: Event,
}

/// The central event router.
#[derive(Debug, Clone)]
pub struct Router {
    matcher: Matcher,
    dedup: DedupCache,
    config: RouterConfig,
}

impl Router {
    /// Create a router with default configuration.
    #[must_use]
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        topology: Arc<dyn TopologyResolver>,
        live_routes: Arc<dyn LiveRouteSource>,
        sent: Arc<dyn TimestampMap>,
    ) -> Self {
        Self::with_config(store, topology, live_routes, sent, RouterConfig::default())
    }

    /// Create a router with custom configuration.
    #[must_use]
    pub fn with_config(
        store: Arc<dyn SubscriptionStore>,
        topology: Arc<dyn TopologyResolver>,
        live_routes: Arc<dyn LiveRouteSource>,
        sent: Arc<dyn TimestampMap>,
        config: RouterConfig,
    ) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            matcher: Matcher::new(store, topology, live_routes),
            dedup: DedupCache::new(sent, config.dedup_ttl),
            config,
        }
    }

    /// The matcher used for selection.
    #[must_use]
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// The dedup cache.
    #[must_use]
    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Route an event, returning the pushes to make.
    ///
    /// # Errors
    ///
    /// Returns an error if the event lacks the identity fields routing
    /// depends on.
    pub fn route(&self, event: &Event, now: DateTime<Utc>) -> Result<Vec<Outgoing>, RouteError> {
        if let Err(e) = validate(event) {
            warn!(kind = %event.kind(), error = %e, "Dropping malformed event");
            return Err(e);
        }

        if !self.accepts(event) {
            trace!(kind = %event.kind(), producer = ?event.producer_ref(), "Skipping event from unaccepted producer");
            return Ok(Vec::new());
        }

        let selected = self.matcher.select(event);
        let mut outgoing = Vec::with_capacity(selected.len());

        for subscription in selected {
            let Some(trimmed) = self.trim(event, &subscription) else {
                info!(
                    subscription = %subscription.id,
                    kind = %event.kind(),
                    "Not pushing as all affects are removed"
                );
                continue;
            };
            if !self.dedup.should_send(&subscription.id, &trimmed, now) {
                continue;
            }
            outgoing.push(Outgoing {
                subscription,
                event: trimmed,
            });
        }

        debug!(kind = %event.kind(), pushes = outgoing.len(), "Routed event");
        Ok(outgoing)
    }

    fn accepts(&self, event: &Event) -> bool {
        self.config.accepted_producers.is_empty()
            || event
                .producer_ref()
                .is_some_and(|p| {
                    self.config
                        .accepted_producers
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(p))
                })
    }

    fn trim(&self, event: &Event, subscription: &Subscription) -> Option<Event> {
        let stops = self.matcher.subscribed_stops(subscription);
        match event {
            Event::Situation(sx) => trim_situation(sx, subscription, &stops).map(Event::Situation),
            Event::VehicleJourney(et) => Some(Event::VehicleJourney(trim_vehicle_journey(
                et,
                subscription,
                &stops,
            ))),
        }
    }
}

fn validate(event: &Event) -> Result<(), RouteError> {
    match event {
        Event::Situation(sx) => {
            if sx
                .situation_number
                .as_deref()
                .map_or(true, |n| n.trim().is_empty())
            {
                return Err(RouteError::MissingSituationNumber);
            }
        }
        Event::VehicleJourney(et) => {
            if et.line_ref.is_none()
                && et.vehicle_ref.is_none()
                && et.dated_vehicle_journey_ref.is_none()
            {
                return Err(RouteError::MissingJourneyIdentity);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalTimestampMap;
    use crate::live_route::NoLiveRoutes;
    use crate::store::InMemoryStore;
    use crate::topology::NoTopology;
    use ferry_model::{AffectedVehicleJourney, AffectsScope, Call, SituationUpdate, VehicleJourneyUpdate};

    const PUSH: &str = "http://localhost/push";

    fn router_with(store: Arc<InMemoryStore>, config: RouterConfig) -> Router {
        Router::with_config(
            store,
            Arc::new(NoTopology),
            Arc::new(NoLiveRoutes),
            Arc::new(LocalTimestampMap::new()),
            config,
        )
    }

    fn situation(version: u64) -> SituationUpdate {
        SituationUpdate::new("status-1", version)
            .with_participant("NSB")
            .with_affects(AffectsScope {
                vehicle_journeys: vec![AffectedVehicleJourney::on_line(
                    "NSB:Line:L1",
                    ["Stop1", "Stop2", "Stop3", "Stop4"],
                    true,
                )],
                ..AffectsScope::default()
            })
    }

    #[test]
    fn test_route_situation_trims_per_subscription() {
        let store = Arc::new(InMemoryStore::new());
        let stops = store
            .add(Subscription::new("stops", PUSH).with_stops("Stop2", "Stop3"))
            .unwrap();
        store
            .add(Subscription::new("reverse", PUSH).with_stops("Stop3", "Stop2"))
            .unwrap();
        let router = router_with(store, RouterConfig::default());

        let outgoing = router.route(&situation(1).into(), Utc::now()).unwrap();

        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].subscription.id, stops.id);
        match &outgoing[0].event {
            Event::Situation(sx) => {
                let route = &sx.affects.as_ref().unwrap().vehicle_journeys[0].routes[0];
                assert_eq!(route.stop_point_count(), 2);
            }
            other => panic!("Expected situation, got {:?}", other),
        }
    }

    #[test]
    fn test_route_dedups_by_version() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add(Subscription::new("cs", PUSH).with_codespace("NSB"))
            .unwrap();
        let router = router_with(store, RouterConfig::default());
        let now = Utc::now();

        assert_eq!(router.route(&situation(1).into(), now).unwrap().len(), 1);
        assert!(router.route(&situation(1).into(), now).unwrap().is_empty());
        assert_eq!(router.route(&situation(2).into(), now).unwrap().len(), 1);
    }

    #[test]
    fn test_route_rejects_malformed_events() {
        let router = router_with(Arc::new(InMemoryStore::new()), RouterConfig::default());
        let mut anonymous = situation(1);
        anonymous.situation_number = None;

        assert!(matches!(
            router.route(&anonymous.into(), Utc::now()),
            Err(RouteError::MissingSituationNumber)
        ));
        assert!(matches!(
            router.route(&VehicleJourneyUpdate::default().into(), Utc::now()),
            Err(RouteError::MissingJourneyIdentity)
        ));
    }

    #[test]
    fn test_route_accepted_producers() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add(Subscription::new("cs", PUSH).with_codespace("RUT"))
            .unwrap();
        let config = RouterConfig {
            accepted_producers: ["nsb".to_string()].into_iter().collect(),
            ..RouterConfig::default()
        };
        let router = router_with(store, config);

        let mut journey = VehicleJourneyUpdate::new("RUT:Line:1", "dated-1")
            .with_estimated_call(Call::at("NSR:Quay:1"));
        journey.data_source = Some("RUT".to_string());

        assert!(router.route(&journey.into(), Utc::now()).unwrap().is_empty());
        assert_eq!(router.route(&situation(1).into(), Utc::now()).unwrap().len(), 0);
    }

    #[test]
    fn test_route_vehicle_journey() {
        let store = Arc::new(InMemoryStore::new());
        let stops = store
            .add(Subscription::new("stops", PUSH).with_stops("NSR:Quay:1", "NSR:Quay:3"))
            .unwrap();
        let line = store
            .add(Subscription::new("line", PUSH).with_line("NSB:Line:L1"))
            .unwrap();
        let router = router_with(store, RouterConfig::default());

        let mut journey = VehicleJourneyUpdate::new("NSB:Line:L1", "dated-1")
            .with_estimated_call(Call::at("NSR:Quay:1"))
            .with_estimated_call(Call::at("NSR:Quay:2"))
            .with_estimated_call(Call::at("NSR:Quay:3"));
        journey.is_complete_stop_sequence = Some(true);
        let event: Event = journey.into();

        let outgoing = router.route(&event, Utc::now()).unwrap();
        assert_eq!(outgoing.len(), 2);

        let calls = |id: &str| match &outgoing.iter().find(|o| o.subscription.id == id).unwrap().event {
            Event::VehicleJourney(et) => et.estimated_calls.len(),
            other => panic!("Expected vehicle journey, got {:?}", other),
        };
        assert_eq!(calls(&stops.id), 2);
        assert_eq!(calls(&line.id), 3);

        assert!(router.route(&event, Utc::now()).unwrap().is_empty());
    }
}

//! Subscription matching.
//!
//! Decides which subscriptions an event affects. Stop pairs are directional:
//! a subscription from A to B matches a journey that visits A (or one of its
//! quays) before B. Line, vehicle and codespace criteria are plain set
//! membership tests.

use crate::live_route::LiveRouteSource;
use crate::store::SubscriptionStore;
use crate::subscription::{Subscription, SubscriptionId};
use crate::topology::TopologyResolver;
use ferry_model::refs::{is_quay, is_registry_stop, is_station};
use ferry_model::{AffectedVehicleJourney, AffectsScope, Event, SituationUpdate, VehicleJourneyUpdate};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// What is known about one journey when testing subscription criteria.
#[derive(Debug, Default)]
struct JourneyContext<'a> {
    line_ref: Option<&'a str>,
    journey_refs: Vec<&'a str>,
    codespace: Option<&'a str>,
    stops: Vec<String>,
}

/// Matches events against the stored subscriptions.
#[derive(Clone)]
pub struct Matcher {
    store: Arc<dyn SubscriptionStore>,
    topology: Arc<dyn TopologyResolver>,
    live_routes: Arc<dyn LiveRouteSource>,
}

impl Matcher {
    /// Create a matcher over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        topology: Arc<dyn TopologyResolver>,
        live_routes: Arc<dyn LiveRouteSource>,
    ) -> Self {
        Self {
            store,
            topology,
            live_routes,
        }
    }

    /// Every stop of the subscription, with stations expanded to their quays.
    #[must_use]
    pub fn subscribed_stops(&self, subscription: &Subscription) -> HashSet<String> {
        self.expand(subscription.stops())
    }

    fn expand<'a>(&self, stops: impl Iterator<Item = &'a str>) -> HashSet<String> {
        let mut expanded = HashSet::new();
        for stop in stops {
            if is_station(stop) {
                expanded.extend(self.topology.quays_of(stop));
            }
            expanded.insert(stop.to_string());
        }
        expanded
    }

    /// Check whether an ordered stop sequence passes the subscription's
    /// from stops before its to stops.
    #[must_use]
    pub fn affected<S: AsRef<str>>(&self, subscription: &Subscription, sequence: &[S]) -> bool {
        if subscription.from_stops.is_empty() || subscription.to_stops.is_empty() {
            return false;
        }
        let from = self.expand(subscription.from_stops.iter().map(String::as_str));
        let to = self.expand(subscription.to_stops.iter().map(String::as_str));

        let Some(first_from) = sequence.iter().position(|s| from.contains(s.as_ref())) else {
            return false;
        };
        sequence[first_from + 1..]
            .iter()
            .any(|s| to.contains(s.as_ref()))
    }

    /// Collect the registry stops an affected scope mentions.
    ///
    /// Looks at affected stop points, affected stop places and the routes of
    /// affected journeys. References outside the stop registry (roads,
    /// areas) are ignored.
    #[must_use]
    pub fn find_affected_stop_point_refs(affects: &AffectsScope) -> BTreeSet<String> {
        let direct = affects
            .stop_points
            .iter()
            .filter_map(|sp| sp.stop_point_ref.as_deref());
        let places = affects
            .stop_places
            .iter()
            .filter_map(|sp| sp.stop_place_ref.as_deref());
        let routes = affects
            .vehicle_journeys
            .iter()
            .flat_map(|j| j.routes.iter())
            .flat_map(|r| r.stop_refs());

        direct
            .chain(places)
            .chain(routes)
            .filter(|s| is_registry_stop(s))
            .map(str::to_string)
            .collect()
    }

    /// Subscriptions registered on a stop, or on the station of a quay.
    #[must_use]
    pub fn subscriptions_for_stop(&self, stop_ref: &str) -> Vec<Subscription> {
        let mut found = self.store.query_by_stop(stop_ref);
        if is_quay(stop_ref) {
            if let Some(station) = self.topology.station_of(stop_ref) {
                let for_station = self.store.query_by_stop(&station);
                trace!(quay = %stop_ref, station = %station, count = for_station.len(), "Subscriptions on parent station");
                found.extend(for_station);
            }
        }
        found
    }

    /// Subscriptions affected by any of the given journeys.
    ///
    /// A subscription is affected when at least one of its criteria
    /// categories is set and every set category matches the journey.
    #[must_use]
    pub fn find_affected_subscriptions(
        &self,
        journeys: &[AffectedVehicleJourney],
        codespace: Option<&str>,
    ) -> Vec<Subscription> {
        let subscriptions = self.store.list();
        let mut affected = BTreeMap::new();

        for journey in journeys {
            let journey_refs: Vec<&str> = journey
                .vehicle_journey_refs
                .iter()
                .map(String::as_str)
                .collect();

            let sequences: Vec<Vec<String>> = if journey.routes.is_empty() {
                vec![Vec::new()]
            } else {
                journey
                    .routes
                    .iter()
                    .map(|route| {
                        let listed: Vec<String> = route.stop_refs().map(str::to_string).collect();
                        let affected_only = route
                            .stop_points
                            .as_ref()
                            .is_some_and(|sp| sp.affected_only);
                        if affected_only {
                            listed
                        } else {
                            self.live_route(&journey_refs).unwrap_or(listed)
                        }
                    })
                    .collect()
            };

            for stops in sequences {
                let context = JourneyContext {
                    line_ref: journey.line_ref.as_deref(),
                    journey_refs: journey_refs.clone(),
                    codespace,
                    stops,
                };
                collect_matching(&subscriptions, &mut affected, |s| {
                    self.matches_journey(s, &context)
                });
            }
        }

        affected.into_values().collect()
    }

    /// Subscriptions affected by a situation.
    #[must_use]
    pub fn select_for_situation(&self, situation: &SituationUpdate) -> Vec<Subscription> {
        let Some(affects) = situation.affects.as_ref() else {
            return Vec::new();
        };
        let participant = situation.participant_ref.as_deref();
        let mut selected = BTreeMap::new();

        let stops = Self::find_affected_stop_point_refs(affects);
        for stop in &stops {
            for subscription in self.subscriptions_for_stop(stop) {
                selected.insert(subscription.id.clone(), subscription);
            }
        }

        for subscription in self.find_affected_subscriptions(&affects.vehicle_journeys, participant) {
            selected.insert(subscription.id.clone(), subscription);
        }

        let lines: BTreeSet<&str> = affects
            .networks
            .iter()
            .flat_map(|n| n.affected_lines.iter())
            .filter_map(|l| l.line_ref.as_deref())
            .collect();
        for line in lines {
            let matching = self.store.query_by_line(line);
            collect_matching(&matching, &mut selected, |s| {
                s.has_no_stops() && codespace_matches(s, participant)
            });
        }

        if let Some(codespace) = participant {
            let matching = self.store.query_by_codespace(codespace);
            collect_matching(&matching, &mut selected, |s| {
                s.has_no_stops() && s.line_refs.is_empty()
            });
        }

        debug!(
            situation = ?situation.situation_number,
            stops = stops.len(),
            subscriptions = selected.len(),
            "Selected subscriptions for situation"
        );
        selected.into_values().collect()
    }

    /// Subscriptions affected by a vehicle journey update.
    #[must_use]
    pub fn select_for_vehicle_journey(&self, journey: &VehicleJourneyUpdate) -> Vec<Subscription> {
        let journey_refs: Vec<&str> = journey.journey_refs().collect();
        let calls: Vec<String> = journey.stop_sequence().map(str::to_string).collect();

        let stops = if journey.is_complete_stop_sequence == Some(true) {
            calls
        } else {
            self.live_route(&journey_refs).unwrap_or(calls)
        };

        let context = JourneyContext {
            line_ref: journey.line_ref.as_deref(),
            journey_refs,
            codespace: journey.data_source.as_deref(),
            stops,
        };

        let mut selected = BTreeMap::new();
        collect_matching(&self.store.list(), &mut selected, |s| {
            self.matches_journey(s, &context)
        });

        debug!(
            line = ?journey.line_ref,
            journey = ?journey.dated_vehicle_journey_ref,
            subscriptions = selected.len(),
            "Selected subscriptions for vehicle journey"
        );
        selected.into_values().collect()
    }

    /// Subscriptions affected by an event.
    #[must_use]
    pub fn select(&self, event: &Event) -> Vec<Subscription> {
        match event {
            Event::Situation(sx) => self.select_for_situation(sx),
            Event::VehicleJourney(et) => self.select_for_vehicle_journey(et),
        }
    }

    fn live_route(&self, journey_refs: &[&str]) -> Option<Vec<String>> {
        journey_refs
            .iter()
            .find_map(|r| self.live_routes.current_stop_sequence(r))
    }

    fn matches_journey(&self, subscription: &Subscription, context: &JourneyContext<'_>) -> bool {
        let mut has_criteria = false;

        if !subscription.has_no_stops() {
            has_criteria = true;
            if !self.affected(subscription, &context.stops) {
                return false;
            }
        }
        if !subscription.line_refs.is_empty() {
            has_criteria = true;
            if !context
                .line_ref
                .is_some_and(|l| subscription.line_refs.contains(l))
            {
                return false;
            }
        }
        if !subscription.vehicle_refs.is_empty() {
            has_criteria = true;
            if !context
                .journey_refs
                .iter()
                .any(|r| subscription.vehicle_refs.contains(*r))
            {
                return false;
            }
        }
        if !subscription.codespaces.is_empty() {
            has_criteria = true;
            if !codespace_matches(subscription, context.codespace) {
                return false;
            }
        }

        has_criteria
    }
}

fn codespace_matches(subscription: &Subscription, codespace: Option<&str>) -> bool {
    subscription.codespaces.is_empty()
        || codespace.is_some_and(|c| subscription.codespaces.contains(c))
}

fn collect_matching(
    candidates: &[Subscription],
    into: &mut BTreeMap<SubscriptionId, Subscription>,
    mut keep: impl FnMut(&Subscription) -> bool,
) {
    for subscription in candidates {
        if !into.contains_key(&subscription.id) && keep(subscription) {
            into.insert(subscription.id.clone(), subscription.clone());
        }
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("subscriptions", &self.store.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_route::{InMemoryLiveRoutes, NoLiveRoutes};
    use crate::store::InMemoryStore;
    use crate::topology::{NoTopology, StaticTopology};
    use chrono::Utc;
    use ferry_model::{
        AffectedLine, AffectedNetwork, AffectedStopPlace, AffectedStopPoint, Call,
    };

    const PUSH: &str = "http://localhost/push";

    fn matcher(store: Arc<InMemoryStore>) -> Matcher {
        Matcher::new(store, Arc::new(NoTopology), Arc::new(NoLiveRoutes))
    }

    fn add(store: &InMemoryStore, subscription: Subscription) -> Subscription {
        store.add(subscription).unwrap()
    }

    #[test]
    fn test_affected_direction() {
        let store = Arc::new(InMemoryStore::new());
        let matcher = matcher(store);
        let sequence = ["Stop1", "Stop2", "Stop3", "Stop4"];

        let forward = Subscription::new("fwd", PUSH).with_stops("Stop2", "Stop3");
        let backward = Subscription::new("bwd", PUSH).with_stops("Stop3", "Stop2");
        let far = Subscription::new("far", PUSH).with_stops("Stop1", "Stop4");

        assert!(matcher.affected(&forward, &sequence));
        assert!(!matcher.affected(&backward, &sequence));
        assert!(matcher.affected(&far, &sequence));
    }

    #[test]
    fn test_affected_requires_both_sides() {
        let matcher = matcher(Arc::new(InMemoryStore::new()));
        let same = Subscription::new("same", PUSH).with_stops("Stop2", "Stop2");
        let none = Subscription::new("none", PUSH).with_line("L1");

        assert!(!matcher.affected(&same, &["Stop2"]));
        assert!(!matcher.affected(&none, &["Stop1", "Stop2"]));
        assert!(!matcher.affected(&same, Vec::<String>::new().as_slice()));
    }

    #[test]
    fn test_affected_expands_stations() {
        let topology = StaticTopology::new()
            .with_station("NSR:StopPlace:1", ["NSR:Quay:11", "NSR:Quay:12"])
            .with_station("NSR:StopPlace:2", ["NSR:Quay:21"]);
        let matcher = Matcher::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(topology),
            Arc::new(NoLiveRoutes),
        );
        let subscription =
            Subscription::new("stations", PUSH).with_stops("NSR:StopPlace:1", "NSR:StopPlace:2");

        assert!(matcher.affected(&subscription, &["NSR:Quay:12", "NSR:Quay:21"]));
        assert!(!matcher.affected(&subscription, &["NSR:Quay:21", "NSR:Quay:11"]));
        assert_eq!(matcher.subscribed_stops(&subscription).len(), 5);
    }

    #[test]
    fn test_find_affected_stop_point_refs() {
        let affects = AffectsScope {
            stop_points: vec![
                AffectedStopPoint::new("NSR:Quay:1"),
                AffectedStopPoint::new("NPRA:Road:7"),
                AffectedStopPoint::default(),
            ],
            stop_places: vec![AffectedStopPlace::new("NSR:StopPlace:2")],
            vehicle_journeys: vec![AffectedVehicleJourney::on_line(
                "NSB:Line:L1",
                ["NSR:Quay:3", "nsr:Quay:4", "AREA:5"],
                true,
            )],
            ..AffectsScope::default()
        };

        let refs = Matcher::find_affected_stop_point_refs(&affects);

        let expected: BTreeSet<String> = ["NSR:Quay:1", "NSR:StopPlace:2", "NSR:Quay:3", "nsr:Quay:4"]
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(refs, expected);
    }

    #[test]
    fn test_find_affected_subscriptions_authoritative_route() {
        let store = Arc::new(InMemoryStore::new());
        let forward = add(&store, Subscription::new("fwd", PUSH).with_stops("Stop2", "Stop3"));
        add(&store, Subscription::new("bwd", PUSH).with_stops("Stop3", "Stop2"));
        let matcher = matcher(store);

        let journeys = vec![AffectedVehicleJourney::on_line(
            "NSB:Line:L1",
            ["Stop1", "Stop2", "Stop3", "Stop4"],
            true,
        )];
        let affected = matcher.find_affected_subscriptions(&journeys, None);

        assert_eq!(affected, vec![forward]);
    }

    #[test]
    fn test_find_affected_subscriptions_uses_live_route() {
        let store = Arc::new(InMemoryStore::new());
        let subscription = add(&store, Subscription::new("fwd", PUSH).with_stops("Stop1", "Stop4"));
        let routes = InMemoryLiveRoutes::new();
        routes.insert("journey-1", ["Stop1", "Stop2", "Stop3", "Stop4"], Utc::now());
        let matcher = Matcher::new(store, Arc::new(NoTopology), Arc::new(routes));

        // Only the middle of the journey is listed
        let partial = AffectedVehicleJourney::on_line("NSB:Line:L1", ["Stop2", "Stop3"], false);

        assert!(matcher
            .find_affected_subscriptions(&[partial.clone()], None)
            .is_empty());
        let affected = matcher
            .find_affected_subscriptions(&[partial.with_vehicle_journey("journey-1")], None);
        assert_eq!(affected, vec![subscription]);
    }

    #[test]
    fn test_find_affected_subscriptions_falls_back_to_listed_stops() {
        let store = Arc::new(InMemoryStore::new());
        let subscription = add(&store, Subscription::new("fwd", PUSH).with_stops("Stop2", "Stop3"));
        let matcher = matcher(store);

        let journey = AffectedVehicleJourney::on_line("NSB:Line:L1", ["Stop2", "Stop3"], false)
            .with_vehicle_journey("unknown-journey");

        assert_eq!(
            matcher.find_affected_subscriptions(&[journey], None),
            vec![subscription]
        );
    }

    #[test]
    fn test_find_affected_subscriptions_all_categories() {
        let store = Arc::new(InMemoryStore::new());
        let line = add(&store, Subscription::new("line", PUSH).with_line("NSB:Line:L1"));
        let other_line = add(&store, Subscription::new("other", PUSH).with_line("NSB:Line:L2"));
        let stops_and_line = add(
            &store,
            Subscription::new("both", PUSH)
                .with_stops("Stop1", "Stop2")
                .with_line("NSB:Line:L2"),
        );
        let codespace = add(&store, Subscription::new("cs", PUSH).with_codespace("NSB"));
        let matcher = matcher(store);

        let journeys = vec![AffectedVehicleJourney::on_line(
            "NSB:Line:L1",
            ["Stop1", "Stop2"],
            true,
        )];
        let affected: Vec<SubscriptionId> = matcher
            .find_affected_subscriptions(&journeys, Some("NSB"))
            .into_iter()
            .map(|s| s.id)
            .collect();

        assert!(affected.contains(&line.id));
        assert!(affected.contains(&codespace.id));
        assert!(!affected.contains(&other_line.id));
        assert!(!affected.contains(&stops_and_line.id));
    }

    #[test]
    fn test_select_for_situation() {
        let store = Arc::new(InMemoryStore::new());
        let on_stop = add(&store, Subscription::new("stop", PUSH).with_stops("NSR:Quay:2", "NSR:Quay:9"));
        let on_line = add(&store, Subscription::new("line", PUSH).with_line("NSB:Line:L1"));
        let on_codespace = add(&store, Subscription::new("cs", PUSH).with_codespace("NSB"));
        let unrelated = add(&store, Subscription::new("rut", PUSH).with_codespace("RUT"));
        let matcher = matcher(store);

        let affects = AffectsScope {
            stop_points: vec![AffectedStopPoint::new("NSR:Quay:2")],
            networks: vec![AffectedNetwork {
                network_ref: None,
                affected_lines: vec![AffectedLine::new("NSB:Line:L1")],
            }],
            ..AffectsScope::default()
        };
        let situation = SituationUpdate::new("status-1", 1)
            .with_participant("NSB")
            .with_affects(affects);

        let selected: Vec<SubscriptionId> = matcher
            .select(&situation.into())
            .into_iter()
            .map(|s| s.id)
            .collect();

        assert!(selected.contains(&on_stop.id));
        assert!(selected.contains(&on_line.id));
        assert!(selected.contains(&on_codespace.id));
        assert!(!selected.contains(&unrelated.id));
    }

    #[test]
    fn test_select_for_situation_quay_reaches_station() {
        let store = Arc::new(InMemoryStore::new());
        let station = add(
            &store,
            Subscription::new("station", PUSH).with_stops("NSR:StopPlace:1", "NSR:StopPlace:2"),
        );
        let topology = StaticTopology::new().with_station("NSR:StopPlace:1", ["NSR:Quay:11"]);
        let matcher = Matcher::new(store, Arc::new(topology), Arc::new(NoLiveRoutes));

        let situation = SituationUpdate::new("status-1", 1).with_affects(AffectsScope {
            stop_points: vec![AffectedStopPoint::new("NSR:Quay:11")],
            ..AffectsScope::default()
        });

        assert_eq!(matcher.select_for_situation(&situation), vec![station]);
    }

    #[test]
    fn test_select_for_situation_without_affects() {
        let store = Arc::new(InMemoryStore::new());
        add(&store, Subscription::new("cs", PUSH).with_codespace("NSB"));
        let matcher = matcher(store);

        let situation = SituationUpdate::new("status-1", 1).with_participant("NSB");

        assert!(matcher.select_for_situation(&situation).is_empty());
    }

    #[test]
    fn test_select_for_vehicle_journey() {
        let store = Arc::new(InMemoryStore::new());
        let forward = add(&store, Subscription::new("fwd", PUSH).with_stops("NSR:Quay:1", "NSR:Quay:3"));
        add(&store, Subscription::new("bwd", PUSH).with_stops("NSR:Quay:3", "NSR:Quay:1"));
        let vehicle = add(
            &store,
            Subscription::new("vehicle", PUSH)
                .with_codespace("NSB")
                .with_vehicle("2118"),
        );
        add(
            &store,
            Subscription::new("other-vehicle", PUSH)
                .with_codespace("NSB")
                .with_vehicle("9999"),
        );
        let matcher = matcher(store);

        let mut journey = VehicleJourneyUpdate::new("NSB:Line:L1", "dated-1")
            .with_estimated_call(Call::at("NSR:Quay:1"))
            .with_estimated_call(Call::at("NSR:Quay:2"))
            .with_estimated_call(Call::at("NSR:Quay:3"));
        journey.vehicle_ref = Some("2118".to_string());
        journey.data_source = Some("NSB".to_string());
        journey.is_complete_stop_sequence = Some(true);

        let selected: Vec<SubscriptionId> = matcher
            .select(&journey.into())
            .into_iter()
            .map(|s| s.id)
            .collect();

        assert_eq!(selected.len(), 2);
        assert!(selected.contains(&forward.id));
        assert!(selected.contains(&vehicle.id));
    }

    #[test]
    fn test_select_for_incomplete_journey_uses_live_route() {
        let store = Arc::new(InMemoryStore::new());
        let subscription = add(
            &store,
            Subscription::new("fwd", PUSH).with_stops("NSR:Quay:1", "NSR:Quay:3"),
        );
        let routes = InMemoryLiveRoutes::new();
        routes.insert("dated-1", ["NSR:Quay:1", "NSR:Quay:2", "NSR:Quay:3"], Utc::now());
        let matcher = Matcher::new(store, Arc::new(NoTopology), Arc::new(routes));

        // Only the last call is left in the update
        let journey = VehicleJourneyUpdate::new("NSB:Line:L1", "dated-1")
            .with_estimated_call(Call::at("NSR:Quay:3"));

        assert_eq!(matcher.select_for_vehicle_journey(&journey), vec![subscription]);
    }
}

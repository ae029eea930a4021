//! Per-subscription message trimming.
//!
//! Trimming never touches the received event; it returns a reduced copy
//! holding only the parts of the affected scope the subscriber asked for.

use crate::subscription::Subscription;
use ferry_model::{AffectedVehicleJourney, AffectsScope, SituationUpdate, VehicleJourneyUpdate};
use std::collections::HashSet;

/// Trim a situation for a subscription.
///
/// `subscribed_stops` is the subscription's stop set with stations expanded
/// to their quays. Returns `None` when nothing relevant to the subscriber is
/// left, in which case the situation must not be pushed.
#[must_use]
pub fn trim_situation(
    situation: &SituationUpdate,
    subscription: &Subscription,
    subscribed_stops: &HashSet<String>,
) -> Option<SituationUpdate> {
    let affects = situation.affects.as_ref()?;

    // Sections outside the national profile are never forwarded
    let mut trimmed = AffectsScope {
        networks: affects.networks.clone(),
        stop_places: affects.stop_places.clone(),
        vehicle_journeys: affects.vehicle_journeys.clone(),
        ..AffectsScope::default()
    };

    if !subscription.is_firehose() {
        trim_networks(&mut trimmed, subscription);
        if subscription.has_no_stops() {
            trimmed.stop_places.clear();
        } else {
            trimmed.stop_places.retain(|sp| {
                sp.stop_place_ref
                    .as_deref()
                    .is_some_and(|r| subscribed_stops.contains(r))
            });
        }
        trim_journeys(&mut trimmed.vehicle_journeys, subscription, subscribed_stops);
    }

    if !trimmed.has_profile_content() {
        return None;
    }

    let mut copy = situation.clone();
    copy.affects = Some(trimmed);
    Some(copy)
}

fn trim_networks(affects: &mut AffectsScope, subscription: &Subscription) {
    for network in &mut affects.networks {
        network.affected_lines.retain(|line| {
            line.line_ref
                .as_deref()
                .is_some_and(|l| subscription.line_refs.contains(l))
        });
    }
    affects.networks.retain(|n| !n.affected_lines.is_empty());
}

fn trim_journeys(
    journeys: &mut Vec<AffectedVehicleJourney>,
    subscription: &Subscription,
    subscribed_stops: &HashSet<String>,
) {
    journeys.retain_mut(|journey| {
        if !on_subscribed_line(journey, subscription) {
            return false;
        }
        if !subscription.has_no_stops() {
            for route in &mut journey.routes {
                if let Some(stop_points) = route.stop_points.as_mut() {
                    // Link projections carry no stop and are kept
                    stop_points.points.retain(|p| {
                        p.stop_ref()
                            .map_or(!p.is_stop_point(), |r| subscribed_stops.contains(r))
                    });
                }
            }
            journey.routes.retain(|r| r.stop_point_count() > 0);
        }
        !journey.routes.is_empty()
    });
}

fn on_subscribed_line(journey: &AffectedVehicleJourney, subscription: &Subscription) -> bool {
    match journey.line_ref.as_deref().map(str::trim) {
        Some(line) if !line.is_empty() && !subscription.line_refs.is_empty() => {
            subscription.line_refs.contains(line)
        }
        _ => true,
    }
}

/// Trim a vehicle journey update for a subscription.
///
/// Subscribers on stops only receive the calls at their stops, and the
/// stop sequence is marked incomplete. Everyone else gets the full update.
#[must_use]
pub fn trim_vehicle_journey(
    journey: &VehicleJourneyUpdate,
    subscription: &Subscription,
    subscribed_stops: &HashSet<String>,
) -> VehicleJourneyUpdate {
    let mut copy = journey.clone();
    if !subscription.has_no_stops() {
        copy.retain_calls(|stop| subscribed_stops.contains(stop));
        copy.is_complete_stop_sequence = Some(false);
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_model::{
        AffectedLine, AffectedNetwork, AffectedRoute, AffectedStopPlace, AffectedStopPoint,
        Call, LinkProjection, RoutePoint,
    };

    const PUSH: &str = "http://localhost/push";

    fn stops(subscription: &Subscription) -> HashSet<String> {
        subscription.stops().map(str::to_string).collect()
    }

    /// Three journeys: two on line L1 (4 and 3 stops), one on L2.
    fn situation() -> SituationUpdate {
        let affects = AffectsScope {
            area_of_interest: Some("national".to_string()),
            operators: vec!["NSB:Operator:1".to_string()],
            roads: vec!["NPRA:Road:1".to_string()],
            stop_points: vec![AffectedStopPoint::new("NSR:Quay:1")],
            stop_places: vec![
                AffectedStopPlace::new("NSR:StopPlace:1"),
                AffectedStopPlace::new("NSR:StopPlace:9"),
            ],
            networks: vec![AffectedNetwork {
                network_ref: Some("NSB:Network:1".to_string()),
                affected_lines: vec![
                    AffectedLine::new("NSB:Line:L1"),
                    AffectedLine::new("NSB:Line:L2"),
                ],
            }],
            vehicle_journeys: vec![
                AffectedVehicleJourney::on_line(
                    "NSB:Line:L1",
                    ["NSR:StopPlace:1", "NSR:StopPlace:2", "NSR:StopPlace:3", "NSR:StopPlace:4"],
                    true,
                ),
                AffectedVehicleJourney::on_line(
                    "NSB:Line:L1",
                    ["NSR:StopPlace:2", "NSR:StopPlace:3", "NSR:StopPlace:5"],
                    true,
                ),
                AffectedVehicleJourney::on_line(
                    "NSB:Line:L2",
                    ["NSR:StopPlace:6", "NSR:StopPlace:7"],
                    true,
                ),
            ],
            ..AffectsScope::default()
        };
        SituationUpdate::new("status-1", 1)
            .with_participant("NSB")
            .with_affects(affects)
    }

    fn journeys(trimmed: &SituationUpdate) -> &[AffectedVehicleJourney] {
        &trimmed.affects.as_ref().unwrap().vehicle_journeys
    }

    #[test]
    fn test_trim_for_stops() {
        let subscription =
            Subscription::new("stops", PUSH).with_stops("NSR:StopPlace:1", "NSR:StopPlace:2");
        let original = situation();

        let trimmed = trim_situation(&original, &subscription, &stops(&subscription)).unwrap();
        let affects = trimmed.affects.as_ref().unwrap();

        assert_eq!(affects.vehicle_journeys.len(), 2);
        assert_eq!(affects.vehicle_journeys[0].routes[0].stop_point_count(), 2);
        assert_eq!(affects.vehicle_journeys[1].routes[0].stop_point_count(), 1);
        assert_eq!(affects.stop_places, vec![AffectedStopPlace::new("NSR:StopPlace:1")]);
        assert!(affects.networks.is_empty());
        // The received event is left untouched
        assert_eq!(journeys(&original).len(), 3);
        assert_eq!(original.affects.as_ref().unwrap().stop_places.len(), 2);
    }

    #[test]
    fn test_trim_for_codespace_keeps_everything_in_profile() {
        let subscription = Subscription::new("cs", PUSH).with_codespace("NSB");

        let trimmed = trim_situation(&situation(), &subscription, &stops(&subscription)).unwrap();
        let affects = trimmed.affects.as_ref().unwrap();

        assert_eq!(affects.vehicle_journeys.len(), 3);
        assert_eq!(affects.vehicle_journeys[0].routes[0].stop_point_count(), 4);
        assert_eq!(affects.stop_places.len(), 2);
        assert_eq!(affects.networks[0].affected_lines.len(), 2);
        assert!(affects.area_of_interest.is_none());
        assert!(affects.operators.is_empty());
        assert!(affects.roads.is_empty());
        assert!(affects.stop_points.is_empty());
    }

    #[test]
    fn test_trim_for_line() {
        let subscription = Subscription::new("line", PUSH).with_line("NSB:Line:L1");

        let trimmed = trim_situation(&situation(), &subscription, &stops(&subscription)).unwrap();
        let affects = trimmed.affects.as_ref().unwrap();

        assert_eq!(affects.vehicle_journeys.len(), 2);
        assert_eq!(affects.vehicle_journeys[0].routes[0].stop_point_count(), 4);
        assert_eq!(affects.vehicle_journeys[1].routes[0].stop_point_count(), 3);
        assert!(affects.stop_places.is_empty());
        assert_eq!(
            affects.networks[0].affected_lines,
            vec![AffectedLine::new("NSB:Line:L1")]
        );
    }

    #[test]
    fn test_trim_removes_everything() {
        let subscription = Subscription::new("line", PUSH).with_line("NSB:Line:L9");
        let mut original = situation();
        original
            .affects
            .as_mut()
            .unwrap()
            .vehicle_journeys
            .retain(|j| j.line_ref.as_deref() == Some("NSB:Line:L2"));

        assert!(trim_situation(&original, &subscription, &stops(&subscription)).is_none());
        assert!(
            trim_situation(&SituationUpdate::new("x", 1), &subscription, &HashSet::new()).is_none()
        );
    }

    #[test]
    fn test_trim_keeps_links_between_kept_stops() {
        let subscription =
            Subscription::new("stops", PUSH).with_stops("NSR:StopPlace:1", "NSR:StopPlace:2");
        let mut route = AffectedRoute::through(["NSR:StopPlace:1", "NSR:StopPlace:2"], true);
        if let Some(sp) = route.stop_points.as_mut() {
            sp.points
                .insert(1, RoutePoint::LinkProjection(LinkProjection::default()));
        }
        let journey = AffectedVehicleJourney {
            line_ref: None,
            vehicle_journey_refs: Vec::new(),
            routes: vec![route, AffectedRoute::default()],
        };
        let situation = SituationUpdate::new("status-2", 1).with_affects(AffectsScope {
            vehicle_journeys: vec![journey],
            ..AffectsScope::default()
        });

        let trimmed = trim_situation(&situation, &subscription, &stops(&subscription)).unwrap();
        let routes = &journeys(&trimmed)[0].routes;

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].stop_points.as_ref().unwrap().points.len(), 3);
    }

    #[test]
    fn test_trim_vehicle_journey() {
        let journey = VehicleJourneyUpdate::new("NSB:Line:L1", "dated-1")
            .with_estimated_call(Call::at("NSR:Quay:1"))
            .with_estimated_call(Call::at("NSR:Quay:2"))
            .with_estimated_call(Call::at("NSR:Quay:3"));
        let on_stops = Subscription::new("stops", PUSH).with_stops("NSR:Quay:1", "NSR:Quay:3");
        let on_line = Subscription::new("line", PUSH).with_line("NSB:Line:L1");

        let for_stops = trim_vehicle_journey(&journey, &on_stops, &stops(&on_stops));
        let for_line = trim_vehicle_journey(&journey, &on_line, &stops(&on_line));

        assert_eq!(for_stops.estimated_calls.len(), 2);
        assert_eq!(for_stops.is_complete_stop_sequence, Some(false));
        assert_eq!(for_line, journey);
    }
}

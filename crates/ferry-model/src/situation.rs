//! Situation updates (disruption messages).
//!
//! A situation carries its identity (`situation_number` + `version`) and an
//! affected scope describing which networks, stop places and vehicle
//! journeys the disruption applies to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A disruption message from a producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationUpdate {
    /// Producer-assigned situation identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation_number: Option<String>,
    /// Version of the situation, bumped by the producer on every change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Producer (codespace) that published the situation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_ref: Option<String>,
    /// When the situation was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    /// Periods the situation is valid for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validity_periods: Vec<ValidityPeriod>,
    /// Short human readable summaries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summaries: Vec<String>,
    /// Longer human readable descriptions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<String>,
    /// What the situation affects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affects: Option<AffectsScope>,
}

impl SituationUpdate {
    /// Create a situation with the given identity and no affected scope.
    #[must_use]
    pub fn new(situation_number: impl Into<String>, version: u64) -> Self {
        Self {
            situation_number: Some(situation_number.into()),
            version: Some(version),
            ..Self::default()
        }
    }

    /// Set the producer reference.
    #[must_use]
    pub fn with_participant(mut self, participant: impl Into<String>) -> Self {
        self.participant_ref = Some(participant.into());
        self
    }

    /// Set the affected scope.
    #[must_use]
    pub fn with_affects(mut self, affects: AffectsScope) -> Self {
        self.affects = Some(affects);
        self
    }
}

/// Half-open validity period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityPeriod {
    /// Start of the period.
    pub start_time: Option<DateTime<Utc>>,
    /// End of the period, open-ended when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// The affected scope of a situation.
///
/// Only `networks`, `stop_places` and `vehicle_journeys` are part of the
/// national profile; the remaining sections are accepted on input but never
/// forwarded to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectsScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_of_interest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operators: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<AffectedNetwork>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub places: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_points: Vec<AffectedStopPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_places: Vec<AffectedStopPlace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vehicle_journeys: Vec<AffectedVehicleJourney>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roads: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vehicles: Vec<String>,
}

impl AffectsScope {
    /// Check whether any section subscribers care about is still populated.
    #[must_use]
    pub fn has_profile_content(&self) -> bool {
        !self.stop_places.is_empty() || !self.vehicle_journeys.is_empty() || !self.networks.is_empty()
    }
}

/// An affected network and the lines within it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedNetwork {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_lines: Vec<AffectedLine>,
}

/// An affected line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedLine {
    pub line_ref: Option<String>,
}

impl AffectedLine {
    /// Create an affected line.
    #[must_use]
    pub fn new(line_ref: impl Into<String>) -> Self {
        Self {
            line_ref: Some(line_ref.into()),
        }
    }
}

/// An affected stop point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedStopPoint {
    pub stop_point_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_point_name: Option<String>,
}

impl AffectedStopPoint {
    /// Create an affected stop point.
    #[must_use]
    pub fn new(stop_point_ref: impl Into<String>) -> Self {
        Self {
            stop_point_ref: Some(stop_point_ref.into()),
            stop_point_name: None,
        }
    }
}

/// An affected stop place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedStopPlace {
    pub stop_place_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
}

impl AffectedStopPlace {
    /// Create an affected stop place.
    #[must_use]
    pub fn new(stop_place_ref: impl Into<String>) -> Self {
        Self {
            stop_place_ref: Some(stop_place_ref.into()),
            place_name: None,
        }
    }
}

/// An affected vehicle journey.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedVehicleJourney {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vehicle_journey_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<AffectedRoute>,
}

impl AffectedVehicleJourney {
    /// Create a journey on a line with a single route over the given stops.
    #[must_use]
    pub fn on_line<I, S>(line_ref: impl Into<String>, stops: I, affected_only: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            line_ref: Some(line_ref.into()),
            vehicle_journey_refs: Vec::new(),
            routes: vec![AffectedRoute::through(stops, affected_only)],
        }
    }

    /// Add a vehicle journey reference.
    #[must_use]
    pub fn with_vehicle_journey(mut self, vehicle_journey_ref: impl Into<String>) -> Self {
        self.vehicle_journey_refs.push(vehicle_journey_ref.into());
        self
    }
}

/// A route of an affected journey.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedRoute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_points: Option<RouteStopPoints>,
}

impl AffectedRoute {
    /// Create a route visiting the given stops in order.
    #[must_use]
    pub fn through<I, S>(stops: I, affected_only: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stop_points: Some(RouteStopPoints {
                affected_only,
                points: stops
                    .into_iter()
                    .map(|s| RoutePoint::StopPoint(AffectedStopPoint::new(s)))
                    .collect(),
            }),
        }
    }

    /// Stop references of this route, in order.
    pub fn stop_refs(&self) -> impl Iterator<Item = &str> {
        self.stop_points
            .iter()
            .flat_map(|sp| sp.points.iter())
            .filter_map(RoutePoint::stop_ref)
    }

    /// Number of stop points (links excluded).
    #[must_use]
    pub fn stop_point_count(&self) -> usize {
        self.stop_points
            .as_ref()
            .map(|sp| sp.points.iter().filter(|p| p.is_stop_point()).count())
            .unwrap_or(0)
    }
}

/// The stop points of a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStopPoints {
    /// When `true` the points are a complete, ordered stop sequence.
    /// When `false` they may be a partial listing and the live route is
    /// consulted for the order.
    #[serde(default)]
    pub affected_only: bool,
    /// Stop points interleaved with link projections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<RoutePoint>,
}

/// Either a stop point or the link projection towards the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoutePoint {
    StopPoint(AffectedStopPoint),
    LinkProjection(LinkProjection),
}

impl RoutePoint {
    /// The stop reference, when this is a stop point.
    #[must_use]
    pub fn stop_ref(&self) -> Option<&str> {
        match self {
            RoutePoint::StopPoint(sp) => sp.stop_point_ref.as_deref(),
            RoutePoint::LinkProjection(_) => None,
        }
    }

    /// Check whether this is a stop point.
    #[must_use]
    pub fn is_stop_point(&self) -> bool {
        matches!(self, RoutePoint::StopPoint(_))
    }
}

/// Geometry of the link towards the next stop point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkProjection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<(f64, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_stop_refs_skip_links() {
        let mut route = AffectedRoute::through(["NSR:StopPlace:1", "NSR:StopPlace:2"], true);
        if let Some(sp) = route.stop_points.as_mut() {
            sp.points
                .insert(1, RoutePoint::LinkProjection(LinkProjection::default()));
        }

        let refs: Vec<&str> = route.stop_refs().collect();
        assert_eq!(refs, vec!["NSR:StopPlace:1", "NSR:StopPlace:2"]);
        assert_eq!(route.stop_point_count(), 2);
    }

    #[test]
    fn test_profile_content() {
        let mut scope = AffectsScope::default();
        assert!(!scope.has_profile_content());

        scope.roads.push("NPRA:Road:1".to_string());
        assert!(!scope.has_profile_content());

        scope.stop_places.push(AffectedStopPlace::new("NSR:StopPlace:1"));
        assert!(scope.has_profile_content());
    }

    #[test]
    fn test_situation_json_shape() {
        let situation = SituationUpdate::new("status-1", 3).with_participant("NSB");
        let json = serde_json::to_value(&situation).unwrap();

        assert_eq!(json["situationNumber"], "status-1");
        assert_eq!(json["version"], 3);
        assert_eq!(json["participantRef"], "NSB");
        assert!(json.get("affects").is_none());
    }
}

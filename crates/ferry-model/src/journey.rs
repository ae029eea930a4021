//! Vehicle journey updates (estimated timetables).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Real-time state of a single vehicle journey.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleJourneyUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dated_vehicle_journey_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_ref: Option<String>,
    /// Producer (codespace) of the update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<bool>,
    /// Whether the calls below form the complete, ordered stop sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete_stop_sequence: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recorded_calls: Vec<Call>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub estimated_calls: Vec<Call>,
}

impl VehicleJourneyUpdate {
    /// Create an update for a journey on a line.
    #[must_use]
    pub fn new(line_ref: impl Into<String>, dated_vehicle_journey_ref: impl Into<String>) -> Self {
        Self {
            line_ref: Some(line_ref.into()),
            dated_vehicle_journey_ref: Some(dated_vehicle_journey_ref.into()),
            ..Self::default()
        }
    }

    /// Append an estimated call at the given stop.
    #[must_use]
    pub fn with_estimated_call(mut self, call: Call) -> Self {
        self.estimated_calls.push(call);
        self
    }

    /// References identifying this journey, most specific first.
    pub fn journey_refs(&self) -> impl Iterator<Item = &str> {
        self.dated_vehicle_journey_ref
            .as_deref()
            .into_iter()
            .chain(self.vehicle_ref.as_deref())
    }

    /// Stop references of all calls in travel order (recorded before estimated).
    pub fn stop_sequence(&self) -> impl Iterator<Item = &str> {
        self.recorded_calls
            .iter()
            .chain(self.estimated_calls.iter())
            .filter_map(|c| c.stop_point_ref.as_deref())
    }

    /// Retain only calls whose stop satisfies the predicate.
    pub fn retain_calls(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let mut keep_call = |c: &Call| c.stop_point_ref.as_deref().is_some_and(&mut keep);
        self.recorded_calls.retain(&mut keep_call);
        self.estimated_calls.retain(&mut keep_call);
    }
}

/// A recorded or estimated call at a stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub stop_point_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_point_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aimed_arrival_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_arrival_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aimed_departure_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_departure_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_platform_name: Option<String>,
}

impl Call {
    /// Create a call at a stop.
    #[must_use]
    pub fn at(stop_point_ref: impl Into<String>) -> Self {
        Self {
            stop_point_ref: Some(stop_point_ref.into()),
            ..Self::default()
        }
    }

    /// Set the expected departure time.
    #[must_use]
    pub fn departing(mut self, expected: DateTime<Utc>) -> Self {
        self.expected_departure_time = Some(expected);
        self
    }
}

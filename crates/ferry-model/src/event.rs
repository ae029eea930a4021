//! Inbound events.
//!
//! The two event kinds have different matching and trimming rules, so they
//! travel through Ferry as one tagged sum type and every stage dispatches on
//! the variant.

use crate::journey::VehicleJourneyUpdate;
use crate::situation::SituationUpdate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Situation,
    VehicleJourney,
}

impl EventKind {
    /// Path suffix appended to a subscriber's address in legacy delivery mode.
    #[must_use]
    pub fn legacy_suffix(self) -> &'static str {
        match self {
            EventKind::Situation => "/sx",
            EventKind::VehicleJourney => "/et",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Situation => write!(f, "situation"),
            EventKind::VehicleJourney => write!(f, "vehicle_journey"),
        }
    }
}

/// A parsed event from a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Event {
    Situation(SituationUpdate),
    VehicleJourney(VehicleJourneyUpdate),
}

impl Event {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Situation(_) => EventKind::Situation,
            Event::VehicleJourney(_) => EventKind::VehicleJourney,
        }
    }

    /// Producer reference placed on the delivery envelope.
    #[must_use]
    pub fn producer_ref(&self) -> Option<&str> {
        match self {
            Event::Situation(sx) => sx.participant_ref.as_deref(),
            Event::VehicleJourney(et) => et.data_source.as_deref(),
        }
    }
}

impl From<SituationUpdate> for Event {
    fn from(sx: SituationUpdate) -> Self {
        Event::Situation(sx)
    }
}

impl From<VehicleJourneyUpdate> for Event {
    fn from(et: VehicleJourneyUpdate) -> Self {
        Event::VehicleJourney(et)
    }
}

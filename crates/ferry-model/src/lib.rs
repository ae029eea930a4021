//! # ferry-model
//!
//! Event and envelope definitions for the Ferry notification router.
//!
//! Producers hand Ferry already-parsed events. This crate defines those
//! value types, the envelope pushed to subscribers, and the codec used to
//! put both on the wire.
//!
//! ## Event Types
//!
//! - `SituationUpdate` - Disruption affecting stops, lines, networks or journeys
//! - `VehicleJourneyUpdate` - Recorded/estimated calls for a single journey
//! - `Envelope` - Versioned wrapper for service deliveries and notifications
//!
//! ## Example
//!
//! ```rust
//! use ferry_model::{codec, Event, SituationUpdate};
//!
//! let situation = SituationUpdate::new("status-1", 1);
//! let event = Event::Situation(situation);
//!
//! let encoded = codec::encode(&event).unwrap();
//! let decoded: Event = codec::decode(&encoded).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod envelope;
pub mod event;
pub mod journey;
pub mod refs;
pub mod situation;
pub mod version;

pub use codec::{decode, encode, CodecError, CONTENT_TYPE};
pub use envelope::{Delivery, Envelope, EnvelopeBody};
pub use event::{Event, EventKind};
pub use journey::{Call, VehicleJourneyUpdate};
pub use situation::{
    AffectedLine, AffectedNetwork, AffectedRoute, AffectedStopPlace, AffectedStopPoint,
    AffectedVehicleJourney, AffectsScope, LinkProjection, RoutePoint, RouteStopPoints,
    SituationUpdate, ValidityPeriod,
};
pub use version::{Version, ENVELOPE_VERSION};

//! Delivery envelope.
//!
//! Subscribers on the enveloped model receive every push wrapped in a
//! versioned envelope: service deliveries for events, plus heartbeat and
//! subscription-terminated notifications.

use crate::event::Event;
use crate::journey::VehicleJourneyUpdate;
use crate::situation::SituationUpdate;
use crate::version::{Version, ENVELOPE_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A versioned push envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: Version,
    #[serde(flatten)]
    pub body: EnvelopeBody,
}

/// Envelope contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeBody {
    /// Event delivery.
    #[serde(rename_all = "camelCase")]
    ServiceDelivery {
        response_timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        producer_ref: Option<String>,
        delivery: Delivery,
    },

    /// Periodic liveness signal.
    #[serde(rename_all = "camelCase")]
    HeartbeatNotification {
        request_timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        producer_ref: Option<String>,
    },

    /// The subscription has ended and no more deliveries follow.
    #[serde(rename_all = "camelCase")]
    SubscriptionTerminatedNotification {
        response_timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscriber_ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription_ref: Option<String>,
    },
}

/// Delivered event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Delivery {
    EstimatedTimetable(Vec<VehicleJourneyUpdate>),
    SituationExchange(Vec<SituationUpdate>),
}

impl Envelope {
    /// Wrap an event in a service delivery.
    #[must_use]
    pub fn service_delivery(event: Event, now: DateTime<Utc>) -> Self {
        let producer_ref = event.producer_ref().map(str::to_string);
        let delivery = match event {
            Event::Situation(sx) => Delivery::SituationExchange(vec![sx]),
            Event::VehicleJourney(et) => Delivery::EstimatedTimetable(vec![et]),
        };
        Self {
            version: ENVELOPE_VERSION,
            body: EnvelopeBody::ServiceDelivery {
                response_timestamp: now,
                producer_ref,
                delivery,
            },
        }
    }

    /// Create a heartbeat notification.
    #[must_use]
    pub fn heartbeat(producer_ref: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            body: EnvelopeBody::HeartbeatNotification {
                request_timestamp: now,
                producer_ref,
            },
        }
    }

    /// Create a subscription-terminated notification.
    #[must_use]
    pub fn terminated(
        subscriber_ref: Option<String>,
        subscription_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            body: EnvelopeBody::SubscriptionTerminatedNotification {
                response_timestamp: now,
                subscriber_ref,
                subscription_ref,
            },
        }
    }

    /// Check whether this is a heartbeat.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self.body, EnvelopeBody::HeartbeatNotification { .. })
    }

    /// Check whether this is a termination notice.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        matches!(
            self.body,
            EnvelopeBody::SubscriptionTerminatedNotification { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn test_service_delivery_carries_producer() {
        let mut journey = VehicleJourneyUpdate::new("L1", "J1");
        journey.data_source = Some("TEST".to_string());
        let envelope = Envelope::service_delivery(journey.clone().into(), Utc::now());

        match &envelope.body {
            EnvelopeBody::ServiceDelivery {
                producer_ref,
                delivery,
                ..
            } => {
                assert_eq!(producer_ref.as_deref(), Some("TEST"));
                assert_eq!(delivery, &Delivery::EstimatedTimetable(vec![journey]));
            }
            other => panic!("Expected service delivery, got {:?}", other),
        }
    }

    #[test]
    fn test_notifications_decode() {
        let now = Utc::now();
        let heartbeat = Envelope::heartbeat(Some("sub-name".to_string()), now);
        let terminated = Envelope::terminated(Some("req".to_string()), Some("1".to_string()), now);

        let heartbeat: Envelope = codec::decode(&codec::encode(&heartbeat).unwrap()).unwrap();
        let terminated: Envelope = codec::decode(&codec::encode(&terminated).unwrap()).unwrap();

        assert!(heartbeat.is_heartbeat());
        assert!(!heartbeat.is_terminated());
        assert!(terminated.is_terminated());
        assert_eq!(heartbeat.version, ENVELOPE_VERSION);
    }
}

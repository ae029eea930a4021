//! Subscription type for Ferry.
//!
//! A subscription names the criteria an event must meet to be pushed to a
//! subscriber (stop pair, lines, vehicles, codespaces) and where to push it.

use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// A subscription identifier.
pub type SubscriptionId = String;

/// Names starting with this prefix belong to subscriptions created through
/// the enveloped subscription model.
pub const RESERVED_NAME_PREFIX: &str = "SIRI-XML";

/// Subscription errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// No push address given.
    #[error("Push address is required")]
    MissingPushAddress,

    /// No criteria given.
    #[error("No criteria given, must have at least one line ref, one codespace or a from stop and a to stop")]
    NoCriteria,

    /// Only one side of the stop pair given.
    #[error("Must have both from and to stops")]
    AsymmetricStops,

    /// Name collides with the reserved prefix.
    #[error("Illegal name (can't start with '{RESERVED_NAME_PREFIX}'): {0}")]
    ReservedName(String),

    /// Enveloped subscription without requestor or client subscription ref.
    #[error("Requestor ref and client subscription ref are required")]
    MissingSubscriptionRef,

    /// Subscription not found.
    #[error("Subscription not found: {0}")]
    NotFound(String),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A subscriber's interest and delivery settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Assigned by the store on creation.
    #[serde(default)]
    pub id: SubscriptionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub from_stops: BTreeSet<String>,
    #[serde(default)]
    pub to_stops: BTreeSet<String>,
    #[serde(default)]
    pub line_refs: BTreeSet<String>,
    #[serde(default)]
    pub vehicle_refs: BTreeSet<String>,
    #[serde(default)]
    pub codespaces: BTreeSet<String>,
    #[serde(default)]
    pub push_address: String,
    /// Wrap pushes in a versioned envelope instead of posting the bare event
    /// to `<address>/et` or `<address>/sx`.
    #[serde(default)]
    pub enveloped: bool,
    /// Consecutive failed pushes, reset on success.
    #[serde(default)]
    pub failed_push_counter: u32,
    #[serde(
        default,
        with = "duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub heartbeat_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_termination_time: Option<DateTime<Utc>>,
    /// Requestor reference echoed in the termination notice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requestor_ref: Option<String>,
    /// Subscriber-generated subscription reference echoed in the termination notice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_subscription_ref: Option<String>,
}

impl Subscription {
    /// Create a subscription pushing to the given address.
    #[must_use]
    pub fn new(name: impl Into<String>, push_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            push_address: push_address.into(),
            ..Self::default()
        }
    }

    /// Build the reserved name of an enveloped-model subscription.
    #[must_use]
    pub fn reserved_name(requestor: &str, client_subscription_ref: &str) -> String {
        format!("{RESERVED_NAME_PREFIX}-{requestor}-{client_subscription_ref}")
    }

    /// Add a from/to stop pair.
    #[must_use]
    pub fn with_stops(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_stops.insert(from.into());
        self.to_stops.insert(to.into());
        self
    }

    /// Add a line reference.
    #[must_use]
    pub fn with_line(mut self, line_ref: impl Into<String>) -> Self {
        self.line_refs.insert(line_ref.into());
        self
    }

    /// Add a vehicle reference.
    #[must_use]
    pub fn with_vehicle(mut self, vehicle_ref: impl Into<String>) -> Self {
        self.vehicle_refs.insert(vehicle_ref.into());
        self
    }

    /// Add a codespace.
    #[must_use]
    pub fn with_codespace(mut self, codespace: impl Into<String>) -> Self {
        self.codespaces.insert(codespace.into());
        self
    }

    /// Switch to enveloped delivery.
    #[must_use]
    pub fn with_envelope(mut self) -> Self {
        self.enveloped = true;
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Set the initial termination time.
    #[must_use]
    pub fn terminating_at(mut self, at: DateTime<Utc>) -> Self {
        self.initial_termination_time = Some(at);
        self
    }

    /// Check whether the subscription has no stop criteria.
    #[must_use]
    pub fn has_no_stops(&self) -> bool {
        self.from_stops.is_empty() && self.to_stops.is_empty()
    }

    /// Check whether the subscription receives the scope untrimmed.
    ///
    /// That holds for subscriptions limited only by codespace (and
    /// optionally vehicle).
    #[must_use]
    pub fn is_firehose(&self) -> bool {
        self.has_no_stops() && self.line_refs.is_empty() && !self.codespaces.is_empty()
    }

    /// Every stop named by the subscription, unexpanded.
    pub fn stops(&self) -> impl Iterator<Item = &str> {
        self.from_stops
            .iter()
            .chain(self.to_stops.iter())
            .map(String::as_str)
    }

    /// Check whether the name uses the reserved prefix.
    #[must_use]
    pub fn has_reserved_name(&self) -> bool {
        self.name.starts_with(RESERVED_NAME_PREFIX)
    }

    /// Trim every reference and drop blank ones.
    pub fn normalize(&mut self) {
        for set in [
            &mut self.from_stops,
            &mut self.to_stops,
            &mut self.line_refs,
            &mut self.vehicle_refs,
            &mut self.codespaces,
        ] {
            normalize_set(set);
        }
        self.name = self.name.trim().to_string();
        self.push_address = self.push_address.trim().to_string();
    }

    /// Validate the subscription criteria.
    ///
    /// # Errors
    ///
    /// Returns an error if no push address or criteria are given, if only one
    /// side of the stop pair is set, or if the name is reserved and
    /// `allow_reserved` is false.
    pub fn validate(&self, allow_reserved: bool) -> Result<(), SubscriptionError> {
        if self.push_address.is_empty() {
            return Err(SubscriptionError::MissingPushAddress);
        }

        let no_from = self.from_stops.is_empty();
        let no_to = self.to_stops.is_empty();
        if no_from && no_to && self.codespaces.is_empty() && self.line_refs.is_empty() {
            return Err(SubscriptionError::NoCriteria);
        }
        if no_from != no_to {
            return Err(SubscriptionError::AsymmetricStops);
        }

        if !allow_reserved && self.has_reserved_name() {
            return Err(SubscriptionError::ReservedName(self.name.clone()));
        }
        Ok(())
    }

    /// Increase the failed push counter, returning the new value.
    pub fn increase_failed_push_counter(&mut self) -> u32 {
        self.failed_push_counter = self.failed_push_counter.saturating_add(1);
        self.failed_push_counter
    }
}

fn normalize_set(set: &mut BTreeSet<String>) {
    *set = std::mem::take(set)
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

//! Duplicate push suppression.
//!
//! Each push is reduced to a fingerprint scoped to the subscription. A
//! fingerprint recorded within the retention window is not pushed again.
//!
//! Situations are identified by the producer's `situation_number` and
//! `version` only: a situation changed without a version bump counts as
//! already sent. Everything else is identified by the length and SHA-256 of
//! its serialized form.

use crate::cache::TimestampMap;
use chrono::{DateTime, TimeDelta, Utc};
use ferry_model::{codec, Event};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

/// Default retention window for fingerprints (24 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fingerprint cache deciding whether a push was already made.
#[derive(Clone)]
pub struct DedupCache {
    entries: Arc<dyn TimestampMap>,
    ttl: TimeDelta,
}

impl DedupCache {
    /// Create a cache over the given shared map.
    #[must_use]
    pub fn new(entries: Arc<dyn TimestampMap>, ttl: Duration) -> Self {
        Self {
            entries,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Compute the fingerprint of an event pushed to a subscription.
    #[must_use]
    pub fn fingerprint(subscription_id: &str, event: &Event) -> String {
        match event {
            Event::Situation(sx) => {
                // Without a situation number there is nothing to compare against
                let number = sx
                    .situation_number
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let version = sx.version.map(|v| v.to_string()).unwrap_or_default();
                format!("{subscription_id}_{number}_{version}")
            }
            Event::VehicleJourney(_) => match codec::encode(event) {
                Ok(content) => {
                    let digest = hex::encode(Sha256::digest(&content));
                    format!("{subscription_id}_{}_{digest}", content.len())
                }
                Err(e) => {
                    debug!(error = %e, "Could not serialize event for fingerprint");
                    format!("{subscription_id}_{}", Uuid::new_v4())
                }
            },
        }
    }

    /// Check whether the event should be pushed, recording it if so.
    ///
    /// The check and the record happen atomically, so concurrent callers
    /// with the same fingerprint see exactly one `true`.
    #[must_use]
    pub fn should_send(&self, subscription_id: &str, event: &Event, now: DateTime<Utc>) -> bool {
        let key = Self::fingerprint(subscription_id, event);
        let send = self.entries.check_and_record(&key, now, self.ttl);
        if !send {
            debug!(subscription = %subscription_id, key = %key, "Already sent");
        }
        send
    }

    /// Drop fingerprints older than the retention window.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.ttl) else {
            return 0;
        };
        let removed = self.entries.retain_newer_than(cutoff);
        trace!(removed, remaining = self.entries.len(), "Evicted dedup entries");
        removed
    }

    /// Number of recorded fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether no fingerprints are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

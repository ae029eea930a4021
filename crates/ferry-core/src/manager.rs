//! Subscription lifecycle.
//!
//! The manager is the only writer of subscriptions: it validates and stores
//! them, keeps the failed push counter current after every push, and removes
//! subscriptions that are terminated, unreachable or reset by the receiver.

use crate::cache::TimestampMap;
use crate::store::{StoreError, SubscriptionStore};
use crate::subscription::{Subscription, SubscriptionError};
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of consecutive failed pushes tolerated before removal.
pub const DEFAULT_MAX_FAILED_PUSHES: u32 = 3;

/// Result of recording a failed push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFailure {
    /// The subscription is kept with the new counter value.
    Counted(u32),
    /// The counter went past the limit and the subscription was removed.
    Removed(u32),
    /// The subscription was already gone.
    Unknown,
}

/// Owns subscription storage and heartbeat bookkeeping.
#[derive(Clone)]
pub struct SubscriptionManager {
    store: Arc<dyn SubscriptionStore>,
    heartbeats: Arc<dyn TimestampMap>,
    max_failed_pushes: u32,
}

impl SubscriptionManager {
    /// Create a manager over a store and a heartbeat schedule.
    #[must_use]
    pub fn new(store: Arc<dyn SubscriptionStore>, heartbeats: Arc<dyn TimestampMap>) -> Self {
        info!(subscriptions = store.len(), "Subscriptions at startup");
        Self {
            store,
            heartbeats,
            max_failed_pushes: DEFAULT_MAX_FAILED_PUSHES,
        }
    }

    /// Set how many consecutive failed pushes are tolerated.
    #[must_use]
    pub fn with_max_failed_pushes(mut self, max_failed_pushes: u32) -> Self {
        self.max_failed_pushes = max_failed_pushes;
        self
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// The heartbeat schedule.
    #[must_use]
    pub fn heartbeats(&self) -> &Arc<dyn TimestampMap> {
        &self.heartbeats
    }

    /// Add a subscription, or update it if it carries an id.
    ///
    /// # Errors
    ///
    /// Returns a validation error, [`SubscriptionError::NotFound`] when
    /// updating an unknown id, or a store error.
    pub fn add_or_update(&self, subscription: Subscription) -> Result<Subscription, SubscriptionError> {
        self.save(subscription, false)
    }

    /// Subscribe through the enveloped subscription model.
    ///
    /// The subscription is named after its requestor and client subscription
    /// ref, so subscribing again with the same pair replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::MissingSubscriptionRef`] without both
    /// refs, otherwise the same as [`SubscriptionManager::add_or_update`].
    pub fn subscribe_enveloped(
        &self,
        mut subscription: Subscription,
    ) -> Result<Subscription, SubscriptionError> {
        let requestor = subscription.requestor_ref.as_deref().map(str::trim);
        let client_ref = subscription.client_subscription_ref.as_deref().map(str::trim);
        let (Some(requestor), Some(client_ref)) = (requestor, client_ref) else {
            return Err(SubscriptionError::MissingSubscriptionRef);
        };
        if requestor.is_empty() || client_ref.is_empty() {
            return Err(SubscriptionError::MissingSubscriptionRef);
        }

        subscription.name = Subscription::reserved_name(requestor, client_ref);
        subscription.enveloped = true;
        subscription.id = self
            .store
            .get_by_name(&subscription.name)
            .map(|existing| existing.id)
            .unwrap_or_default();
        self.save(subscription, true)
    }

    fn save(
        &self,
        mut subscription: Subscription,
        allow_reserved: bool,
    ) -> Result<Subscription, SubscriptionError> {
        subscription.normalize();
        subscription.validate(allow_reserved)?;

        if subscription.id.trim().is_empty() {
            let added = self.store.add(subscription)?;
            info!(id = %added.id, name = %added.name, "Added new subscription");
            return Ok(added);
        }

        info!(id = %subscription.id, "Updating subscription");
        match self.store.update(&subscription) {
            Ok(()) => {
                info!(id = %subscription.id, "Updated subscription");
                Ok(subscription)
            }
            Err(StoreError::NotFound(id)) => Err(SubscriptionError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a subscription and its heartbeat entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the removal.
    pub fn remove(&self, id: &str) -> Result<Option<Subscription>, SubscriptionError> {
        info!(id = %id, "Removing subscription");
        let removed = self.store.remove(id)?;
        self.heartbeats.remove(id);
        Ok(removed)
    }

    /// Get a subscription by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.store.get(id)
    }

    /// Get a subscription by name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Subscription> {
        self.store.get_by_name(name)
    }

    /// List all subscriptions.
    #[must_use]
    pub fn list(&self) -> Vec<Subscription> {
        let all = self.store.list();
        debug!(count = all.len(), "Listing subscriptions");
        all
    }

    /// Rebuild the store's derived state.
    pub fn reload(&self) {
        info!("Reloading subscription cache");
        self.store.reload();
    }

    /// Record a successful push, resetting the failed push counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the update.
    pub fn record_push_success(&self, id: &str) -> Result<(), SubscriptionError> {
        let has_failures = self
            .store
            .get(id)
            .is_some_and(|s| s.failed_push_counter > 0);
        if has_failures {
            self.store.update_with(id, &mut |s| s.failed_push_counter = 0)?;
            debug!(id = %id, "Reset failed push counter");
        }
        Ok(())
    }

    /// Record a failed push.
    ///
    /// The subscription is removed once the counter exceeds the limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the update or removal.
    pub fn record_push_failure(&self, id: &str) -> Result<PushFailure, SubscriptionError> {
        let mut counter = 0;
        let updated = self.store.update_with(id, &mut |s| {
            counter = s.increase_failed_push_counter();
        })?;
        if updated.is_none() {
            return Ok(PushFailure::Unknown);
        }

        if counter > self.max_failed_pushes {
            info!(id = %id, failures = counter, "Removing subscription after repeated failed pushes");
            self.remove(id)?;
            return Ok(PushFailure::Removed(counter));
        }
        Ok(PushFailure::Counted(counter))
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &self.store.len())
            .field("heartbeats", &self.heartbeats.len())
            .field("max_failed_pushes", &self.max_failed_pushes)
            .finish()
    }
}

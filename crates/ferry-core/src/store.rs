//! Subscription storage.
//!
//! The store owns every subscription. Durable backends implement
//! [`SubscriptionStore`]; [`InMemoryStore`] keeps subscriptions in lock-free
//! maps with secondary indexes by stop, line and codespace.

use crate::subscription::{Subscription, SubscriptionId};
use dashmap::{DashMap, DashSet};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Subscription not found.
    #[error("Subscription not found: {0}")]
    NotFound(String),

    /// Backend failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Durable CRUD and query access to subscriptions.
///
/// Implementations must allow concurrent reads while subscriptions are
/// added, updated and removed.
pub trait SubscriptionStore: Send + Sync {
    /// Store a new subscription, assigning its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn add(&self, subscription: Subscription) -> Result<Subscription, StoreError>;

    /// Replace an existing subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no subscription has the id.
    fn update(&self, subscription: &Subscription) -> Result<(), StoreError>;

    /// Remove a subscription, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn remove(&self, id: &str) -> Result<Option<Subscription>, StoreError>;

    /// Get a subscription by id.
    fn get(&self, id: &str) -> Option<Subscription>;

    /// List all subscriptions.
    fn list(&self) -> Vec<Subscription>;

    /// Subscriptions with the stop in their from or to stops.
    fn query_by_stop(&self, stop_ref: &str) -> Vec<Subscription>;

    /// Subscriptions with the line in their line refs.
    fn query_by_line(&self, line_ref: &str) -> Vec<Subscription>;

    /// Subscriptions with the codespace in their codespaces.
    fn query_by_codespace(&self, codespace: &str) -> Vec<Subscription>;

    /// Number of stored subscriptions.
    fn len(&self) -> usize {
        self.list().len()
    }

    /// Check whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a subscription by name.
    fn get_by_name(&self, name: &str) -> Option<Subscription> {
        self.list().into_iter().find(|s| s.name == name)
    }

    /// Apply a mutation to a stored subscription and persist it.
    ///
    /// Returns the updated subscription, or `None` if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn update_with(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut Subscription),
    ) -> Result<Option<Subscription>, StoreError> {
        let Some(mut subscription) = self.get(id) else {
            return Ok(None);
        };
        f(&mut subscription);
        match self.update(&subscription) {
            Ok(()) => Ok(Some(subscription)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Rebuild any derived state from the backing storage.
    fn reload(&self) {}
}

type Index = DashMap<String, DashSet<SubscriptionId>>;

/// In-memory subscription store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Subscriptions indexed by id.
    subscriptions: DashMap<SubscriptionId, Subscription>,
    /// Stop ref -> subscription ids.
    by_stop: Index,
    /// Line ref -> subscription ids.
    by_line: Index,
    /// Codespace -> subscription ids.
    by_codespace: Index,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, subscription: &Subscription) {
        for stop in subscription.stops() {
            insert_key(&self.by_stop, stop, &subscription.id);
        }
        for line in &subscription.line_refs {
            insert_key(&self.by_line, line, &subscription.id);
        }
        for codespace in &subscription.codespaces {
            insert_key(&self.by_codespace, codespace, &subscription.id);
        }
    }

    fn unindex(&self, subscription: &Subscription) {
        for stop in subscription.stops() {
            remove_key(&self.by_stop, stop, &subscription.id);
        }
        for line in &subscription.line_refs {
            remove_key(&self.by_line, line, &subscription.id);
        }
        for codespace in &subscription.codespaces {
            remove_key(&self.by_codespace, codespace, &subscription.id);
        }
    }

    fn lookup(&self, index: &Index, key: &str) -> Vec<Subscription> {
        // Collect ids first so no index guard is held while reading subscriptions
        let ids: Vec<SubscriptionId> = index
            .get(key)
            .map(|ids| ids.iter().map(|id| id.clone()).collect())
            .unwrap_or_default();

        ids.iter()
            .filter_map(|id| self.subscriptions.get(id).map(|s| s.clone()))
            .collect()
    }
}

fn insert_key(index: &Index, key: &str, id: &str) {
    index.entry(key.to_string()).or_default().insert(id.to_string());
}

fn remove_key(index: &Index, key: &str, id: &str) {
    if let Some(ids) = index.get(key) {
        ids.remove(id);
    }
    index.remove_if(key, |_, ids| ids.is_empty());
}

impl SubscriptionStore for InMemoryStore {
    fn add(&self, mut subscription: Subscription) -> Result<Subscription, StoreError> {
        subscription.id = Uuid::new_v4().to_string();
        self.index(&subscription);
        self.subscriptions
            .insert(subscription.id.clone(), subscription.clone());

        debug!(id = %subscription.id, total = self.subscriptions.len(), "Stored subscription");
        Ok(subscription)
    }

    fn update(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let Some(mut entry) = self.subscriptions.get_mut(&subscription.id) else {
            return Err(StoreError::NotFound(subscription.id.clone()));
        };
        self.unindex(entry.value());
        self.index(subscription);
        *entry = subscription.clone();
        Ok(())
    }

    fn update_with(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut Subscription),
    ) -> Result<Option<Subscription>, StoreError> {
        let Some(mut entry) = self.subscriptions.get_mut(id) else {
            return Ok(None);
        };
        let before = entry.clone();
        f(entry.value_mut());
        entry.id = before.id.clone();
        self.unindex(&before);
        self.index(entry.value());
        Ok(Some(entry.clone()))
    }

    fn remove(&self, id: &str) -> Result<Option<Subscription>, StoreError> {
        let removed = self.subscriptions.remove(id).map(|(_, s)| s);
        if let Some(subscription) = &removed {
            self.unindex(subscription);
            debug!(id = %id, total = self.subscriptions.len(), "Removed subscription");
        }
        Ok(removed)
    }

    fn get(&self, id: &str) -> Option<Subscription> {
        self.subscriptions.get(id).map(|s| s.clone())
    }

    fn list(&self) -> Vec<Subscription> {
        self.subscriptions.iter().map(|e| e.value().clone()).collect()
    }

    fn query_by_stop(&self, stop_ref: &str) -> Vec<Subscription> {
        self.lookup(&self.by_stop, stop_ref)
    }

    fn query_by_line(&self, line_ref: &str) -> Vec<Subscription> {
        self.lookup(&self.by_line, line_ref)
    }

    fn query_by_codespace(&self, codespace: &str) -> Vec<Subscription> {
        self.lookup(&self.by_codespace, codespace)
    }

    fn len(&self) -> usize {
        self.subscriptions.len()
    }

    fn reload(&self) {
        self.by_stop.clear();
        self.by_line.clear();
        self.by_codespace.clear();
        for entry in self.subscriptions.iter() {
            self.index(entry.value());
        }
        info!(total = self.subscriptions.len(), "Rebuilt subscription indexes");
    }
}

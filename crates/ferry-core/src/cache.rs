//! Shared key → timestamp maps.
//!
//! The dedup cache and the heartbeat schedule both keep one timestamp per
//! key. When Ferry runs as several nodes both maps must be shared between
//! them, so they sit behind [`TimestampMap`]. Every implementation must make
//! [`TimestampMap::compute`] atomic per key.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// A concurrent map from string keys to timestamps.
pub trait TimestampMap: Send + Sync {
    /// Get the timestamp stored for a key.
    fn get(&self, key: &str) -> Option<DateTime<Utc>>;

    /// Store a timestamp, returning the previous one.
    fn insert(&self, key: &str, at: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// Remove a key, returning its timestamp.
    fn remove(&self, key: &str) -> Option<DateTime<Utc>>;

    /// Atomically replace the value of a key.
    ///
    /// `f` receives the current value and returns the value to store, or
    /// `None` to remove the key. Returns the previous value.
    fn compute(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<DateTime<Utc>>) -> Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>>;

    /// Remove every entry older than `cutoff`, returning how many were removed.
    fn retain_newer_than(&self, cutoff: DateTime<Utc>) -> usize;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Check whether the map is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `now` for the key unless it was recorded within `window`.
    ///
    /// Returns `true` if `now` was recorded.
    fn check_and_record(&self, key: &str, now: DateTime<Utc>, window: TimeDelta) -> bool {
        let mut recorded = false;
        self.compute(key, &mut |previous| match previous {
            Some(at) if now - at < window => Some(at),
            _ => {
                recorded = true;
                Some(now)
            }
        });
        recorded
    }
}

/// Node-local timestamp map.
#[derive(Debug, Default)]
pub struct LocalTimestampMap {
    entries: DashMap<String, DateTime<Utc>>,
}

impl LocalTimestampMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimestampMap for LocalTimestampMap {
    fn get(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|at| *at)
    }

    fn insert(&self, key: &str, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries.insert(key.to_string(), at)
    }

    fn remove(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.remove(key).map(|(_, at)| at)
    }

    fn compute(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<DateTime<Utc>>) -> Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        // The entry guard holds the shard lock until the new value is in place
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let previous = *entry.get();
                match f(Some(previous)) {
                    Some(next) => {
                        entry.insert(next);
                    }
                    None => {
                        entry.remove();
                    }
                }
                Some(previous)
            }
            Entry::Vacant(entry) => {
                if let Some(next) = f(None) {
                    entry.insert(next);
                }
                None
            }
        }
    }

    fn retain_newer_than(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, at| *at >= cutoff);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

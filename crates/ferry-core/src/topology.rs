//! Stop topology lookups.
//!
//! Stations group quays. Subscriptions may name either; matching expands a
//! station to its quays and an affected quay to its station.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};

/// Maps quays to their parent station and stations to their quays.
pub trait TopologyResolver: Send + Sync {
    /// Parent station of a quay, if known.
    fn station_of(&self, stop_ref: &str) -> Option<String>;

    /// Quays of a station; empty if unknown or not a station.
    fn quays_of(&self, station_ref: &str) -> BTreeSet<String>;
}

/// Resolver without any topology data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTopology;

impl TopologyResolver for NoTopology {
    fn station_of(&self, _stop_ref: &str) -> Option<String> {
        None
    }

    fn quays_of(&self, _station_ref: &str) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Resolver backed by a fixed station → quays table.
#[derive(Debug, Default, Clone)]
pub struct StaticTopology {
    quays: HashMap<String, BTreeSet<String>>,
    stations: HashMap<String, String>,
}

impl StaticTopology {
    /// Create an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a station with its quays.
    #[must_use]
    pub fn with_station<I, S>(mut self, station: impl Into<String>, quays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(station.into(), quays.into_iter().map(Into::into));
        self
    }

    /// Parse a JSON object mapping each station to its list of quays.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not such an object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(transparent)]
        struct Table(HashMap<String, Vec<String>>);

        let Table(table) = serde_json::from_str(json)?;
        let mut topology = Self::new();
        for (station, quays) in table {
            topology.insert(station, quays.into_iter());
        }
        Ok(topology)
    }

    /// Number of known stations.
    #[must_use]
    pub fn station_count(&self) -> usize {
        self.quays.len()
    }

    fn insert(&mut self, station: String, quays: impl Iterator<Item = String>) {
        let entry = self.quays.entry(station.clone()).or_default();
        for quay in quays {
            self.stations.insert(quay.clone(), station.clone());
            entry.insert(quay);
        }
    }
}

impl TopologyResolver for StaticTopology {
    fn station_of(&self, stop_ref: &str) -> Option<String> {
        self.stations.get(stop_ref).cloned()
    }

    fn quays_of(&self, station_ref: &str) -> BTreeSet<String> {
        self.quays.get(station_ref).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_topology() {
        let topology =
            StaticTopology::new().with_station("NSR:StopPlace:1", ["NSR:Quay:11", "NSR:Quay:12"]);

        assert_eq!(
            topology.station_of("NSR:Quay:12").as_deref(),
            Some("NSR:StopPlace:1")
        );
        assert_eq!(topology.quays_of("NSR:StopPlace:1").len(), 2);
        assert!(topology.quays_of("NSR:Quay:12").is_empty());
        assert!(topology.station_of("NSR:Quay:99").is_none());
    }

    #[test]
    fn test_topology_from_json() {
        let topology = StaticTopology::from_json(
            r#"{"NSR:StopPlace:1": ["NSR:Quay:11"], "NSR:StopPlace:2": ["NSR:Quay:21", "NSR:Quay:22"]}"#,
        )
        .unwrap();

        assert_eq!(topology.station_count(), 2);
        assert_eq!(
            topology.station_of("NSR:Quay:22").as_deref(),
            Some("NSR:StopPlace:2")
        );
        assert!(StaticTopology::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_no_topology() {
        assert!(NoTopology.station_of("NSR:Quay:1").is_none());
        assert!(NoTopology.quays_of("NSR:StopPlace:1").is_empty());
    }
}

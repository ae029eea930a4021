//! Stop reference namespace helpers.
//!
//! Stops in the national registry are referenced as `NSR:StopPlace:<n>`
//! (stations) and `NSR:Quay:<n>` (boarding points). Producers also put road
//! and area references in the same fields; those are not stops.

/// Prefix shared by every national stop registry reference.
pub const STOP_REGISTRY_PREFIX: &str = "NSR:";

/// Prefix of station (stop place) references.
pub const STATION_PREFIX: &str = "NSR:StopPlace:";

/// Prefix of quay references.
pub const QUAY_PREFIX: &str = "NSR:Quay:";

/// Check whether a reference belongs to the stop registry namespace.
///
/// The prefix comparison is case-insensitive.
#[must_use]
pub fn is_registry_stop(reference: &str) -> bool {
    reference
        .get(..STOP_REGISTRY_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(STOP_REGISTRY_PREFIX))
}

/// Check whether a reference points at a station.
#[must_use]
pub fn is_station(reference: &str) -> bool {
    reference.starts_with(STATION_PREFIX)
}

/// Check whether a reference points at a quay.
#[must_use]
pub fn is_quay(reference: &str) -> bool {
    reference.starts_with(QUAY_PREFIX)
}

//! Envelope schema versioning.
//!
//! Every enveloped push carries the schema version so receivers can reject
//! deliveries they do not understand.

use serde::{Deserialize, Serialize};

/// Current envelope schema version.
pub const ENVELOPE_VERSION: Version = Version { major: 2, minor: 0 };

/// Envelope schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Version {
    /// Major version - breaking changes increment this.
    pub major: u8,
    /// Minor version - backwards-compatible changes increment this.
    pub minor: u8,
}

impl Version {
    /// Create a new version.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> String {
        v.to_string()
    }
}

impl TryFrom<String> for Version {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (major, minor) = value
            .split_once('.')
            .ok_or_else(|| format!("Invalid version: {value}"))?;
        let major = major
            .parse()
            .map_err(|_| format!("Invalid major version: {value}"))?;
        let minor = minor
            .parse()
            .map_err(|_| format!("Invalid minor version: {value}"))?;
        Ok(Self { major, minor })
    }
}

impl Default for Version {
    fn default() -> Self {
        ENVELOPE_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_form() {
        assert_eq!(ENVELOPE_VERSION.to_string(), "2.0");
        assert_eq!(Version::try_from("1.4".to_string()), Ok(Version::new(1, 4)));
        assert!(Version::try_from("two".to_string()).is_err());
    }
}

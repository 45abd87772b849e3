//! Schema versioning utilities

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of an AIRR schema release or of the schema a document was written against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Semantic version (e.g., "1.4.0")
    pub version: Version,
    /// The string as it appeared in the `Info` block
    pub original: String,
}

impl SchemaVersion {
    /// Parse a version string.
    ///
    /// AIRR releases are usually written as `major.minor` (e.g. `"1.4"`), so
    /// missing components are filled with zero before semver parsing. A leading
    /// `v` is stripped.
    pub fn parse(version_str: &str) -> Result<Self, semver::Error> {
        let trimmed = version_str.trim();
        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let (core, suffix) = match bare.find(['-', '+']) {
            Some(i) => bare.split_at(i),
            None => (bare, ""),
        };
        let padded = match core.split('.').count() {
            1 => format!("{core}.0.0{suffix}"),
            2 => format!("{core}.0{suffix}"),
            _ => bare.to_string(),
        };
        Ok(Self {
            version: Version::parse(&padded)?,
            original: version_str.to_string(),
        })
    }

    /// Get the version string (e.g., "1.4.0")
    pub fn version_string(&self) -> String {
        self.version.to_string()
    }

    /// Two versions are compatible when major and minor agree
    pub fn is_compatible_with(&self, other: &SchemaVersion) -> bool {
        self.version.major == other.version.major && self.version.minor == other.version.minor
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for SchemaVersion {}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.version.cmp(&other.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v = SchemaVersion::parse("1.2.3").unwrap();
        assert_eq!(v.version_string(), "1.2.3");
    }

    #[test]
    fn test_short_versions_are_padded() {
        assert_eq!(SchemaVersion::parse("1.4").unwrap().version_string(), "1.4.0");
        assert_eq!(SchemaVersion::parse("2").unwrap().version_string(), "2.0.0");
        assert_eq!(
            SchemaVersion::parse("1.5-rc1").unwrap().version_string(),
            "1.5.0-rc1"
        );
    }

    #[test]
    fn test_version_with_v_prefix() {
        let v = SchemaVersion::parse("v1.4").unwrap();
        assert_eq!(v.version_string(), "1.4.0");
        assert_eq!(v.to_string(), "v1.4");
    }

    #[test]
    fn test_compatibility_ignores_patch() {
        let a = SchemaVersion::parse("1.4").unwrap();
        let b = SchemaVersion::parse("1.4.1").unwrap();
        let c = SchemaVersion::parse("1.5").unwrap();
        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
        assert!(a < c);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(SchemaVersion::parse("one.four").is_err());
    }
}

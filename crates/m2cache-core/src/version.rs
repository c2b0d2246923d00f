//! Maven version strings
//!
//! Versions are kept verbatim; the only structure m2cache cares about is the
//! SNAPSHOT qualifier and its resolved `timestamp-buildNumber` form.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

const SNAPSHOT: &str = "SNAPSHOT";

fn resolved_snapshot_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*-)?(\d{8}\.\d{6})-(\d+)$").expect("valid regex"))
}

/// A Maven version, e.g. `1.0.0`, `1.0.0-SNAPSHOT` or `1.0.0-20240101.120000-3`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MavenVersion(String);

impl MavenVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the floating form (`1.0.0-SNAPSHOT`)
    pub fn is_snapshot(&self) -> bool {
        self.0 == SNAPSHOT || self.0.ends_with("-SNAPSHOT")
    }

    /// True for the resolved form (`1.0.0-20240101.120000-3`)
    pub fn is_resolved_snapshot(&self) -> bool {
        resolved_snapshot_pattern().is_match(&self.0)
    }

    /// Bind a SNAPSHOT version to a concrete build.
    ///
    /// `1.0.0-SNAPSHOT` with `20240101.120000` and build `3` becomes
    /// `1.0.0-20240101.120000-3`. Release versions are returned unchanged.
    pub fn to_snapshot(&self, timestamp: &str, build_number: u32) -> MavenVersion {
        match self.0.strip_suffix(SNAPSHOT) {
            Some(base) if self.is_snapshot() => {
                MavenVersion(format!("{}{}-{}", base, timestamp, build_number))
            }
            _ => self.clone(),
        }
    }

    /// The floating form of a resolved snapshot version
    pub fn to_floating(&self) -> MavenVersion {
        match resolved_snapshot_pattern().captures(&self.0) {
            Some(caps) => MavenVersion(format!(
                "{}{}",
                caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
                SNAPSHOT
            )),
            None => self.clone(),
        }
    }
}

impl fmt::Display for MavenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MavenVersion {
    fn from(s: &str) -> Self {
        MavenVersion::new(s)
    }
}

impl From<String> for MavenVersion {
    fn from(s: String) -> Self {
        MavenVersion::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_detection() {
        assert!(MavenVersion::new("1.0.0-SNAPSHOT").is_snapshot());
        assert!(MavenVersion::new("SNAPSHOT").is_snapshot());
        assert!(!MavenVersion::new("1.0.0").is_snapshot());
        assert!(!MavenVersion::new("1.0.0-SNAPSHOTX").is_snapshot());
    }

    #[test]
    fn test_to_snapshot() {
        let v = MavenVersion::new("1.0.0-SNAPSHOT");
        let resolved = v.to_snapshot("20240101.120000", 3);
        assert_eq!(resolved.as_str(), "1.0.0-20240101.120000-3");
        assert!(resolved.is_resolved_snapshot());
        assert!(!resolved.is_snapshot());

        let release = MavenVersion::new("1.0.0");
        assert_eq!(release.to_snapshot("20240101.120000", 3), release);
    }

    #[test]
    fn test_to_floating() {
        let resolved = MavenVersion::new("2.1-20231231.235959-17");
        assert_eq!(resolved.to_floating().as_str(), "2.1-SNAPSHOT");
        assert_eq!(MavenVersion::new("2.1").to_floating().as_str(), "2.1");
    }

    #[test]
    fn test_serde_transparent() {
        let v = MavenVersion::new("1.2.3");
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1.2.3\"");
    }
}

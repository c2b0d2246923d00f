//! Maven coordinates: Program, Revision and Archive
//!
//! All three are immutable values. Their repository paths are deterministic:
//!
//! ```text
//! com/acme/widget/                                 Program
//! com/acme/widget/1.0/                             Revision
//! com/acme/widget/1.0/widget-1.0-sources.jar       Archive
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::metadata::METADATA_FILE;
use crate::version::MavenVersion;

/// Default extension when a coordinate omits it
pub const DEFAULT_EXTENSION: &str = "jar";

/// A `groupId:artifactId` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub group: String,
    pub artifact: String,
}

impl Program {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Result<Self> {
        let group = group.into();
        let artifact = artifact.into();
        let coordinate = format!("{}:{}", group, artifact);
        check_segment(&coordinate, "groupId", &group)?;
        check_segment(&coordinate, "artifactId", &artifact)?;
        Ok(Self { group, artifact })
    }

    /// Bind this program to a version
    pub fn version(&self, version: impl Into<MavenVersion>) -> Revision {
        Revision {
            program: self.clone(),
            version: version.into(),
        }
    }

    /// Repository-relative directory, e.g. `com/acme/widget`
    pub fn path(&self) -> String {
        format!("{}/{}", self.group.replace('.', "/"), self.artifact)
    }

    /// Repository-relative path of the program metadata
    pub fn metadata_path(&self) -> String {
        format!("{}/{}", self.path(), METADATA_FILE)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

impl FromStr for Program {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split(':').collect::<Vec<_>>().as_slice() {
            [group, artifact] => Program::new(*group, *artifact),
            _ => Err(CoreError::InvalidCoordinate {
                coordinate: s.to_string(),
                reason: "expected groupId:artifactId".to_string(),
            }),
        }
    }
}

/// A Program bound to a release or SNAPSHOT version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Revision {
    pub program: Program,
    pub version: MavenVersion,
}

impl Revision {
    pub fn is_snapshot(&self) -> bool {
        self.version.is_snapshot()
    }

    /// Repository-relative directory, e.g. `com/acme/widget/1.0`
    pub fn path(&self) -> String {
        format!("{}/{}", self.program.path(), self.version)
    }

    /// Repository-relative path of the revision (snapshot) metadata
    pub fn metadata_path(&self) -> String {
        format!("{}/{}", self.path(), METADATA_FILE)
    }

    /// Unresolved archive of this revision
    pub fn archive(&self, extension: &str, classifier: Option<&str>) -> Archive {
        Archive {
            revision: self.clone(),
            extension: if extension.is_empty() {
                DEFAULT_EXTENSION.to_string()
            } else {
                extension.to_string()
            },
            classifier: classifier.filter(|c| !c.is_empty()).map(str::to_string),
            resolved: None,
        }
    }

    /// The `pom` archive, whose presence marks a published revision
    pub fn pom(&self) -> Archive {
        self.archive("pom", None)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.program, self.version)
    }
}

impl FromStr for Revision {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split(':').collect::<Vec<_>>().as_slice() {
            [group, artifact, version] if !version.is_empty() => {
                Ok(Program::new(*group, *artifact)?.version(*version))
            }
            _ => Err(CoreError::InvalidCoordinate {
                coordinate: s.to_string(),
                reason: "expected groupId:artifactId:version".to_string(),
            }),
        }
    }
}

/// A Revision bound to an extension and optional classifier
///
/// Archives of a SNAPSHOT revision are unresolved until bound to a concrete
/// build, after which their file name embeds the resolved version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Archive {
    pub revision: Revision,
    pub extension: String,
    pub classifier: Option<String>,
    /// Concrete snapshot version, e.g. `1.0-20240101.120000-3`
    pub resolved: Option<MavenVersion>,
}

impl Archive {
    pub fn is_snapshot(&self) -> bool {
        self.revision.is_snapshot()
    }

    /// Release archives are always resolved
    pub fn is_resolved(&self) -> bool {
        !self.is_snapshot() || self.resolved.is_some()
    }

    /// Same coordinate bound to a concrete snapshot version
    pub fn with_resolved(&self, version: MavenVersion) -> Archive {
        Archive {
            resolved: Some(version),
            ..self.clone()
        }
    }

    /// Same coordinate bound to `timestamp-buildNumber`
    pub fn resolve(&self, timestamp: &str, build_number: u32) -> Archive {
        self.with_resolved(self.revision.version.to_snapshot(timestamp, build_number))
    }

    /// The version embedded in the file name
    pub fn file_version(&self) -> &MavenVersion {
        self.resolved.as_ref().unwrap_or(&self.revision.version)
    }

    /// `artifact-version[-classifier].extension`
    pub fn file_name(&self) -> String {
        let mut name = format!("{}-{}", self.revision.program.artifact, self.file_version());
        if let Some(classifier) = &self.classifier {
            name.push('-');
            name.push_str(classifier);
        }
        name.push('.');
        name.push_str(&self.extension);
        name
    }

    /// Repository-relative path, shared by the remote and the local layout
    pub fn path(&self) -> String {
        format!("{}/{}", self.revision.path(), self.file_name())
    }

    /// Location of this archive under a local repository root
    pub fn local_path(&self, root: &Path) -> PathBuf {
        root.join(self.path())
    }
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let program = &self.revision.program;
        write!(f, "{}:{}:{}", program.group, program.artifact, self.extension)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        write!(f, ":{}", self.file_version())
    }
}

/// Parses `group:artifact[:extension[:classifier]]:version`
impl FromStr for Archive {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let (group, artifact, extension, classifier, version) = match parts.as_slice() {
            [g, a, v] => (*g, *a, DEFAULT_EXTENSION, None, *v),
            [g, a, e, v] => (*g, *a, *e, None, *v),
            [g, a, e, c, v] => (*g, *a, *e, Some(*c), *v),
            _ => {
                return Err(CoreError::InvalidCoordinate {
                    coordinate: s.to_string(),
                    reason: "expected groupId:artifactId[:extension[:classifier]]:version"
                        .to_string(),
                });
            }
        };
        if version.is_empty() {
            return Err(CoreError::InvalidCoordinate {
                coordinate: s.to_string(),
                reason: "version must not be empty".to_string(),
            });
        }

        let version = MavenVersion::new(version);
        let program = Program::new(group, artifact)?;
        if version.is_resolved_snapshot() {
            let archive = program.version(version.to_floating()).archive(extension, classifier);
            Ok(archive.with_resolved(version))
        } else {
            Ok(program.version(version).archive(extension, classifier))
        }
    }
}

fn check_segment(coordinate: &str, what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CoreError::InvalidCoordinate {
            coordinate: coordinate.to_string(),
            reason: format!("{} must not be empty", what),
        });
    }
    if value.contains(['/', '\\', ':']) || value == "." || value == ".." {
        return Err(CoreError::InvalidCoordinate {
            coordinate: coordinate.to_string(),
            reason: format!("{} contains an illegal character", what),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Program {
        Program::new("com.acme", "widget").unwrap()
    }

    #[test]
    fn test_paths() {
        let program = widget();
        assert_eq!(program.path(), "com/acme/widget");
        assert_eq!(program.metadata_path(), "com/acme/widget/maven-metadata.xml");

        let revision = program.version("1.0");
        assert_eq!(revision.path(), "com/acme/widget/1.0");
        assert_eq!(
            revision.metadata_path(),
            "com/acme/widget/1.0/maven-metadata.xml"
        );

        let archive = revision.archive("jar", Some("sources"));
        assert_eq!(archive.path(), "com/acme/widget/1.0/widget-1.0-sources.jar");
        assert_eq!(
            archive.local_path(Path::new("/repo")),
            PathBuf::from("/repo/com/acme/widget/1.0/widget-1.0-sources.jar")
        );
    }

    #[test]
    fn test_snapshot_archive_resolution() {
        let archive = widget().version("1.0.0-SNAPSHOT").archive("jar", None);
        assert!(archive.is_snapshot());
        assert!(!archive.is_resolved());
        assert_eq!(archive.file_name(), "widget-1.0.0-SNAPSHOT.jar");

        let resolved = archive.resolve("20240101.120000", 3);
        assert!(resolved.is_resolved());
        assert_eq!(resolved.file_name(), "widget-1.0.0-20240101.120000-3.jar");
        // the revision directory keeps the floating version
        assert_eq!(
            resolved.path(),
            "com/acme/widget/1.0.0-SNAPSHOT/widget-1.0.0-20240101.120000-3.jar"
        );
    }

    #[test]
    fn test_release_archive_is_resolved() {
        let archive = widget().version("1.0").archive("", None);
        assert_eq!(archive.extension, "jar");
        assert!(archive.is_resolved());
    }

    #[test]
    fn test_parse_coordinates() {
        let program: Program = "com.acme:widget".parse().unwrap();
        assert_eq!(program, widget());

        let revision: Revision = "com.acme:widget:1.1".parse().unwrap();
        assert_eq!(revision.version.as_str(), "1.1");

        let archive: Archive = "com.acme:widget:pom:1.1".parse().unwrap();
        assert_eq!(archive.extension, "pom");
        assert_eq!(archive.classifier, None);

        let archive: Archive = "com.acme:widget:jar:sources:1.1".parse().unwrap();
        assert_eq!(archive.classifier.as_deref(), Some("sources"));
        assert_eq!(archive.to_string(), "com.acme:widget:jar:sources:1.1");

        let archive: Archive = "com.acme:widget:2.0-20240101.120000-3".parse().unwrap();
        assert_eq!(archive.revision.version.as_str(), "2.0-SNAPSHOT");
        assert!(archive.is_resolved());
        assert_eq!(archive.file_name(), "widget-2.0-20240101.120000-3.jar");
    }

    #[test]
    fn test_invalid_coordinates() {
        assert!("widget".parse::<Program>().is_err());
        assert!(":widget".parse::<Program>().is_err());
        assert!("com.acme:widget:".parse::<Revision>().is_err());
        assert!("com/acme:widget:1.0".parse::<Archive>().is_err());
        assert!("a:b:c:d:e:f".parse::<Archive>().is_err());
    }
}

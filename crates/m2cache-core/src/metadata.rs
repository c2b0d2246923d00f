//! `maven-metadata.xml` documents
//!
//! Maven uses a single schema for two rather different documents. The one in
//! a `group/artifact` directory lists the released versions of a [`Program`];
//! the one in a `group/artifact/version` directory records the build history
//! of a SNAPSHOT [`Revision`]. Parsing is best effort: unknown elements are
//! skipped and no validation takes place.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use std::fmt::Write;

use crate::coordinates::{Program, Revision};
use crate::error::{CoreError, Result};
use crate::version::MavenVersion;

/// File name of both metadata documents
pub const METADATA_FILE: &str = "maven-metadata.xml";

/// Format of `lastUpdated` and `updated`
pub const MAVEN_DATE_TIME: &str = "%Y%m%d%H%M%S";

/// Format of the snapshot `timestamp`
pub const SNAPSHOT_TIMESTAMP: &str = "%Y%m%d.%H%M%S";

const MODEL_VERSION: &str = "1.1.0";

/// Released versions of a Program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramMetadata {
    pub model_version: Option<String>,
    pub group: String,
    pub artifact: String,
    pub latest: Option<MavenVersion>,
    pub release: Option<MavenVersion>,
    pub versions: Vec<MavenVersion>,
    pub last_updated: DateTime<Utc>,
}

impl ProgramMetadata {
    /// Empty metadata for a program that has never been published
    pub fn new(program: &Program) -> Self {
        Self {
            model_version: Some(MODEL_VERSION.to_string()),
            group: program.group.clone(),
            artifact: program.artifact.clone(),
            latest: None,
            release: None,
            versions: Vec::new(),
            last_updated: Utc::now().trunc_subsecs(0),
        }
    }

    pub fn contains(&self, version: &MavenVersion) -> bool {
        self.versions.contains(version)
    }

    /// Record a newly published version
    pub fn add_version(&mut self, version: MavenVersion) {
        if !self.contains(&version) {
            self.versions.push(version.clone());
        }
        self.latest = Some(version.clone());
        self.release = Some(version);
        self.last_updated = Utc::now().trunc_subsecs(0);
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        let doc = roxmltree::Document::parse(text)?;
        let root = metadata_root(&doc)?;

        let mut metadata = ProgramMetadata {
            model_version: root.attribute("modelVersion").map(|v| v.trim().to_string()),
            group: child_text(&root, "groupId").unwrap_or_default(),
            artifact: child_text(&root, "artifactId").unwrap_or_default(),
            latest: None,
            release: None,
            versions: Vec::new(),
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
        };

        if let Some(versioning) = child_element(&root, "versioning") {
            metadata.latest = child_version(&versioning, "latest");
            metadata.release = child_version(&versioning, "release");
            if let Some(updated) = child_text(&versioning, "lastUpdated") {
                metadata.last_updated = parse_date_time(&updated)?;
            }
            if let Some(versions) = child_element(&versioning, "versions") {
                metadata.versions = versions
                    .children()
                    .filter(|n| n.is_element() && n.has_tag_name("version"))
                    .filter_map(|n| n.text())
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(MavenVersion::new)
                    .collect();
            }
        }

        Ok(metadata)
    }

    pub fn serialize(&self) -> String {
        let mut out = XmlWriter::new(self.model_version.as_deref());
        out.element(1, "groupId", &self.group);
        out.element(1, "artifactId", &self.artifact);
        out.open(1, "versioning");
        if let Some(latest) = &self.latest {
            out.element(2, "latest", latest.as_str());
        }
        if let Some(release) = &self.release {
            out.element(2, "release", release.as_str());
        }
        out.open(2, "versions");
        for version in &self.versions {
            out.element(3, "version", version.as_str());
        }
        out.close(2, "versions");
        out.element(2, "lastUpdated", &format_date_time(&self.last_updated));
        out.close(1, "versioning");
        out.finish()
    }
}

/// The current build of a SNAPSHOT revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// `yyyyMMdd.HHmmss`
    pub timestamp: Option<String>,
    pub build_number: u32,
    pub local_copy: bool,
}

/// One archive of one snapshot build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub extension: String,
    pub classifier: Option<String>,
    pub value: MavenVersion,
    pub updated: DateTime<Utc>,
}

/// Build history of a SNAPSHOT Revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionMetadata {
    pub model_version: Option<String>,
    pub group: String,
    pub artifact: String,
    pub version: Option<MavenVersion>,
    pub snapshot: Snapshot,
    pub snapshot_versions: Vec<SnapshotVersion>,
    pub last_updated: DateTime<Utc>,
}

impl RevisionMetadata {
    pub fn new(revision: &Revision) -> Self {
        Self {
            model_version: Some(MODEL_VERSION.to_string()),
            group: revision.program.group.clone(),
            artifact: revision.program.artifact.clone(),
            version: Some(revision.version.clone()),
            snapshot: Snapshot::default(),
            snapshot_versions: Vec::new(),
            last_updated: Utc::now().trunc_subsecs(0),
        }
    }

    /// The concrete version of the current build of `revision`, if any
    pub fn resolved_version(&self, revision: &Revision) -> Option<MavenVersion> {
        let timestamp = self.snapshot.timestamp.as_deref()?;
        Some(
            revision
                .version
                .to_snapshot(timestamp, self.snapshot.build_number),
        )
    }

    /// True when some archive of the given concrete version is recorded
    pub fn contains(&self, value: &MavenVersion) -> bool {
        self.snapshot_versions.iter().any(|sv| &sv.value == value)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        let doc = roxmltree::Document::parse(text)?;
        let root = metadata_root(&doc)?;

        let mut metadata = RevisionMetadata {
            model_version: root.attribute("modelVersion").map(|v| v.trim().to_string()),
            group: child_text(&root, "groupId").unwrap_or_default(),
            artifact: child_text(&root, "artifactId").unwrap_or_default(),
            version: child_version(&root, "version"),
            snapshot: Snapshot::default(),
            snapshot_versions: Vec::new(),
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
        };

        let Some(versioning) = child_element(&root, "versioning") else {
            return Ok(metadata);
        };

        if let Some(updated) = child_text(&versioning, "lastUpdated") {
            metadata.last_updated = parse_date_time(&updated)?;
        }

        if let Some(snapshot) = child_element(&versioning, "snapshot") {
            metadata.snapshot.timestamp = child_text(&snapshot, "timestamp");
            metadata.snapshot.local_copy =
                child_text(&snapshot, "localCopy").is_some_and(|v| v == "true");
            if let Some(build) = child_text(&snapshot, "buildNumber") {
                metadata.snapshot.build_number =
                    build.parse().map_err(|_| CoreError::InvalidMetadata {
                        message: format!("buildNumber '{}' is not a number", build),
                    })?;
            }
        }

        if let Some(versions) = child_element(&versioning, "snapshotVersions") {
            for node in versions
                .children()
                .filter(|n| n.is_element() && n.has_tag_name("snapshotVersion"))
            {
                let Some(value) = child_version(&node, "value") else {
                    continue;
                };
                let updated = match child_text(&node, "updated") {
                    Some(updated) => parse_date_time(&updated)?,
                    None => DateTime::<Utc>::UNIX_EPOCH,
                };
                metadata.snapshot_versions.push(SnapshotVersion {
                    extension: child_text(&node, "extension").unwrap_or_default(),
                    classifier: child_text(&node, "classifier"),
                    value,
                    updated,
                });
            }
        }

        Ok(metadata)
    }

    pub fn serialize(&self) -> String {
        let mut out = XmlWriter::new(self.model_version.as_deref());
        out.element(1, "groupId", &self.group);
        out.element(1, "artifactId", &self.artifact);
        if let Some(version) = &self.version {
            out.element(1, "version", version.as_str());
        }
        out.open(1, "versioning");
        out.open(2, "snapshot");
        if self.snapshot.local_copy {
            out.element(3, "localCopy", "true");
        } else {
            out.element(3, "buildNumber", &self.snapshot.build_number.to_string());
            if let Some(timestamp) = &self.snapshot.timestamp {
                out.element(3, "timestamp", timestamp);
            }
        }
        out.close(2, "snapshot");
        out.element(2, "lastUpdated", &format_date_time(&self.last_updated));
        out.open(2, "snapshotVersions");
        for sv in &self.snapshot_versions {
            out.open(3, "snapshotVersion");
            out.element(4, "extension", &sv.extension);
            if let Some(classifier) = &sv.classifier {
                out.element(4, "classifier", classifier);
            }
            out.element(4, "value", sv.value.as_str());
            out.element(4, "updated", &format_date_time(&sv.updated));
            out.close(3, "snapshotVersion");
        }
        out.close(2, "snapshotVersions");
        out.close(1, "versioning");
        out.finish()
    }
}

/// Format a time as `yyyyMMddHHmmss`
pub fn format_date_time(time: &DateTime<Utc>) -> String {
    time.format(MAVEN_DATE_TIME).to_string()
}

/// Format a time as a snapshot timestamp, `yyyyMMdd.HHmmss`
pub fn format_snapshot_timestamp(time: &DateTime<Utc>) -> String {
    time.format(SNAPSHOT_TIMESTAMP).to_string()
}

pub fn parse_date_time(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), MAVEN_DATE_TIME)
        .map(|t| t.and_utc())
        .map_err(|source| CoreError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })
}

fn metadata_root<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
) -> Result<roxmltree::Node<'a, 'input>> {
    let root = doc.root_element();
    if !root.has_tag_name("metadata") {
        return Err(CoreError::InvalidMetadata {
            message: format!("expected <metadata>, found <{}>", root.tag_name().name()),
        });
    }
    Ok(root)
}

fn child_element<'a, 'input>(
    node: &roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: &roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    child_element(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn child_version(node: &roxmltree::Node<'_, '_>, name: &str) -> Option<MavenVersion> {
    child_text(node, name).map(MavenVersion::new)
}

/// Indented writer for the small, fixed metadata schema
struct XmlWriter {
    buf: String,
}

impl XmlWriter {
    fn new(model_version: Option<&str>) -> Self {
        let mut buf = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        match model_version {
            Some(mv) => {
                let _ = writeln!(buf, "<metadata modelVersion=\"{}\">", escape(mv));
            }
            None => buf.push_str("<metadata>\n"),
        }
        Self { buf }
    }

    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.buf.push_str("  ");
        }
    }

    fn open(&mut self, depth: usize, name: &str) {
        self.indent(depth);
        let _ = writeln!(self.buf, "<{}>", name);
    }

    fn close(&mut self, depth: usize, name: &str) {
        self.indent(depth);
        let _ = writeln!(self.buf, "</{}>", name);
    }

    fn element(&mut self, depth: usize, name: &str, text: &str) {
        self.indent(depth);
        let _ = writeln!(self.buf, "<{}>{}</{}>", name, escape(text), name);
    }

    fn finish(mut self) -> String {
        self.buf.push_str("</metadata>\n");
        self.buf
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

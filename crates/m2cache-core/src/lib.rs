//! m2cache Core - Maven coordinates and repository metadata
//!
//! This crate provides the value types shared by the m2cache crates:
//! - `Program`: a `groupId:artifactId` pair
//! - `Revision`: a Program bound to a version (release or SNAPSHOT)
//! - `Archive`: a Revision bound to an extension and classifier
//! - `MavenVersion`: version strings with SNAPSHOT awareness
//! - `ProgramMetadata` / `RevisionMetadata`: the `maven-metadata.xml` documents

pub mod coordinates;
pub mod error;
pub mod metadata;
pub mod version;

pub use coordinates::{Archive, Program, Revision};
pub use error::{CoreError, Result};
pub use metadata::{ProgramMetadata, RevisionMetadata, Snapshot, SnapshotVersion, METADATA_FILE};
pub use version::MavenVersion;

//! Release transactions
//!
//! A release stages archives in a private directory, uploads them, moves
//! them into the local repository and finally records the new version in the
//! remote metadata. The local repository never shows a partially published
//! revision: if anything fails before the local commit, the staging
//! directory is dropped and the revision directory is left untouched.
//!
//! ```text
//! open ──add*──▶ close ──▶ upload ──▶ commit locally ──▶ update metadata
//!   │                │
//!   └──── abort ─────┘ (staging discarded, nothing published)
//! ```

use chrono::{DateTime, SubsecRound, Utc};
use std::io::Read;
use std::path::PathBuf;
use tempfile::TempDir;

use m2cache_core::metadata::format_snapshot_timestamp;
use m2cache_core::{
    Archive, MavenVersion, ProgramMetadata, Revision, RevisionMetadata, Snapshot, SnapshotVersion,
};

use crate::cache::RepositoryCache;
use crate::error::{IoResultExt, RepoError, Result};
use crate::store::{read_document, write_atomically};
use crate::transfer::retry;

/// How a release treats existing versions and the remote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseOptions {
    /// Overwrite an existing revision and ignore already published versions
    pub force: bool,
    /// Commit to the local repository only, without touching the remote
    pub local_only: bool,
}

/// How a transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Uploaded, committed locally and recorded in the remote metadata
    Committed,
    /// Committed to the local repository only
    LocalOnly,
    /// Aborted, nothing was published
    Aborted,
}

struct Staged {
    archive: Archive,
    file: PathBuf,
}

/// The build a snapshot release publishes
struct SnapshotBuild {
    timestamp: DateTime<Utc>,
    build_number: u32,
    versions: Vec<SnapshotVersion>,
}

impl SnapshotBuild {
    fn timestamp(&self) -> String {
        format_snapshot_timestamp(&self.timestamp)
    }

    /// Record this build in `metadata`, replacing entries for the same archive
    fn merge_into(&self, mut metadata: RevisionMetadata) -> RevisionMetadata {
        metadata.snapshot = Snapshot {
            timestamp: Some(self.timestamp()),
            build_number: self.build_number,
            local_copy: false,
        };
        for version in &self.versions {
            metadata.snapshot_versions.retain(|existing| {
                existing.extension != version.extension || existing.classifier != version.classifier
            });
            metadata.snapshot_versions.push(version.clone());
        }
        metadata.last_updated = Utc::now().trunc_subsecs(0);
        metadata
    }
}

/// An open release of one revision
pub struct ReleaseTransaction<'a> {
    cache: &'a RepositoryCache,
    revision: Revision,
    options: ReleaseOptions,
    staging: TempDir,
    staged: Vec<Staged>,
    snapshot: Option<SnapshotBuild>,
    aborted: bool,
}

impl<'a> ReleaseTransaction<'a> {
    /// Open a transaction, refusing to overwrite a published release
    ///
    /// Snapshot builds coexist in one directory and are never refused here.
    pub fn open(cache: &'a RepositoryCache, revision: Revision, options: ReleaseOptions) -> Result<Self> {
        let target = cache.root().join(revision.path());
        if !revision.is_snapshot() && target.exists() && !options.force {
            return Err(RepoError::RevisionAlreadyExists {
                revision: revision.to_string(),
                path: target,
            });
        }

        std::fs::create_dir_all(cache.root()).with_path(cache.root())?;
        let staging = tempfile::Builder::new()
            .prefix(".release-")
            .tempdir_in(cache.root())
            .with_path(cache.root())?;

        let snapshot = revision.is_snapshot().then(|| SnapshotBuild {
            timestamp: Utc::now().trunc_subsecs(0),
            build_number: 1,
            versions: Vec::new(),
        });

        tracing::debug!(
            "Opened release of {} in {}",
            revision,
            staging.path().display()
        );

        Ok(Self {
            cache,
            revision,
            options,
            staging,
            staged: Vec::new(),
            snapshot,
            aborted: false,
        })
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// The concrete version archives of this release are published under
    pub fn published_version(&self) -> MavenVersion {
        match &self.snapshot {
            Some(build) => self
                .revision
                .version
                .to_snapshot(&build.timestamp(), build.build_number),
            None => self.revision.version.clone(),
        }
    }

    /// Fix the snapshot build that subsequent archives belong to
    pub fn set_build(&mut self, timestamp: DateTime<Utc>, build_number: u32) -> Result<()> {
        if self.snapshot.is_none() {
            return Err(self.invalid("only snapshot releases have a build"));
        }
        if !self.staged.is_empty() {
            return Err(self.invalid("the build must be set before adding archives"));
        }
        let Some(build) = &mut self.snapshot else {
            return Ok(());
        };
        build.timestamp = timestamp.trunc_subsecs(0);
        build.build_number = build_number;
        Ok(())
    }

    /// Stage the content of `archive`
    ///
    /// A failure while copying aborts the transaction.
    pub fn add(&mut self, archive: &Archive, content: &mut impl Read) -> Result<()> {
        if self.aborted {
            return Err(self.invalid("the transaction was aborted"));
        }
        if archive.revision != self.revision {
            return Err(self.invalid(&format!("{} belongs to another revision", archive)));
        }

        let archive = match &self.snapshot {
            Some(build) => archive.resolve(&build.timestamp(), build.build_number),
            None => archive.clone(),
        };
        if self.staged.iter().any(|s| s.archive == archive) {
            return Err(self.invalid(&format!("{} was already added", archive)));
        }

        let file = self.staging.path().join(archive.file_name());
        let copied = std::fs::File::create(&file).and_then(|mut out| {
            std::io::copy(content, &mut out)?;
            out.sync_all()
        });
        if let Err(e) = copied {
            self.aborted = true;
            return Err(RepoError::io(&file, e));
        }

        if let Some(build) = &mut self.snapshot {
            build.versions.push(SnapshotVersion {
                extension: archive.extension.clone(),
                classifier: archive.classifier.clone(),
                value: archive.file_version().clone(),
                updated: Utc::now().trunc_subsecs(0),
            });
        }
        tracing::debug!("Staged {}", archive);
        self.staged.push(Staged { archive, file });
        Ok(())
    }

    /// Discard everything staged so far
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Publish the staged archives, or discard them if aborted
    ///
    /// The staging directory is removed however this ends.
    pub async fn close(self) -> Result<ReleaseOutcome> {
        if self.aborted {
            tracing::info!("Release of {} aborted", self.revision);
            return Ok(ReleaseOutcome::Aborted);
        }

        if !self.options.local_only {
            self.upload().await?;
        }
        self.commit_local()?;

        if self.options.local_only {
            if self.snapshot.is_none() {
                self.record_local_release()?;
            }
            tracing::info!("Released {} locally", self.revision);
            return Ok(ReleaseOutcome::LocalOnly);
        }

        self.update_remote_metadata().await?;
        tracing::info!("Released {}", self.revision);
        Ok(ReleaseOutcome::Committed)
    }

    /// Upload staged files in order
    ///
    /// When one fails, it and every file uploaded before it are deleted again,
    /// best effort, and the upload error is returned.
    async fn upload(&self) -> Result<()> {
        let transfer = self.cache.transfer();
        for (index, staged) in self.staged.iter().enumerate() {
            let Err(e) = transfer.store(&staged.file, &staged.archive.path()).await else {
                continue;
            };
            tracing::warn!("Upload of {} failed, rolling back: {}", staged.archive, e);
            for uploaded in self.staged[..=index].iter().rev() {
                if let Err(delete_error) = transfer.delete(&uploaded.archive.path()).await {
                    tracing::warn!(
                        "Could not remove {} from the remote: {}",
                        uploaded.archive,
                        delete_error
                    );
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Move staged files into the revision directory
    ///
    /// A release replaces the directory, a snapshot build joins it and
    /// updates the local revision metadata.
    fn commit_local(&self) -> Result<()> {
        let target = self.cache.root().join(self.revision.path());
        if self.snapshot.is_none() && target.exists() {
            std::fs::remove_dir_all(&target).with_path(&target)?;
        }
        std::fs::create_dir_all(&target).with_path(&target)?;

        for staged in &self.staged {
            let dest = target.join(staged.archive.file_name());
            std::fs::rename(&staged.file, &dest).with_path(&dest)?;
        }

        if let Some(build) = &self.snapshot {
            let path = self.cache.root().join(self.revision.metadata_path());
            let current = read_document::<RevisionMetadata>(&path)?
                .unwrap_or_else(|| RevisionMetadata::new(&self.revision));
            self.cache
                .metadata()
                .install_revision(&self.revision, build.merge_into(current))?;
        }
        Ok(())
    }

    /// List a local-only release in the local program metadata
    fn record_local_release(&self) -> Result<()> {
        let program = &self.revision.program;
        let path = self.cache.root().join(program.metadata_path());
        let mut metadata = read_document::<ProgramMetadata>(&path)?
            .unwrap_or_else(|| ProgramMetadata::new(program));
        metadata.add_version(self.revision.version.clone());
        self.cache.metadata().install_program(program, metadata)?;
        Ok(())
    }

    /// Record the release in the remote metadata, retrying on any failure
    async fn update_remote_metadata(&self) -> Result<()> {
        let policy = self.cache.transfer().policy();
        let what = format!("Metadata update for {}", self.revision);
        // every error is retried, including a conflict
        retry(
            policy.metadata_attempts,
            policy.retry_delay,
            &what,
            |_| true,
            |attempt| self.update_metadata_once(attempt),
        )
        .await
    }

    async fn update_metadata_once(&self, attempt: u32) -> Result<()> {
        let transfer = self.cache.transfer();
        let store = self.cache.metadata();

        match &self.snapshot {
            Some(build) => {
                let remote_path = self.revision.metadata_path();
                let scratch = self
                    .staging
                    .path()
                    .join(format!("revision-metadata-{}.xml", attempt));
                let current = if transfer.fetch(&remote_path, &scratch).await? {
                    read_document::<RevisionMetadata>(&scratch)?
                        .unwrap_or_else(|| RevisionMetadata::new(&self.revision))
                } else {
                    RevisionMetadata::new(&self.revision)
                };

                let version = self.published_version();
                if current.contains(&version) && !self.options.force {
                    return Err(self.already_published(&version));
                }

                let merged = build.merge_into(current);
                write_atomically(&scratch, merged.serialize().as_bytes())?;
                transfer.store(&scratch, &remote_path).await?;
                store.install_revision(&self.revision, merged)?;
            }
            None => {
                let program = &self.revision.program;
                let remote_path = program.metadata_path();
                let scratch = self
                    .staging
                    .path()
                    .join(format!("program-metadata-{}.xml", attempt));
                let mut current = if transfer.fetch(&remote_path, &scratch).await? {
                    read_document::<ProgramMetadata>(&scratch)?
                        .unwrap_or_else(|| ProgramMetadata::new(program))
                } else {
                    ProgramMetadata::new(program)
                };

                let version = &self.revision.version;
                if current.contains(version) && !self.options.force {
                    return Err(self.already_published(version));
                }

                current.add_version(version.clone());
                write_atomically(&scratch, current.serialize().as_bytes())?;
                transfer.store(&scratch, &remote_path).await?;
                store.install_program(program, current)?;
            }
        }
        Ok(())
    }

    fn invalid(&self, message: &str) -> RepoError {
        RepoError::InvalidRelease {
            revision: self.revision.to_string(),
            message: message.to_string(),
        }
    }

    fn already_published(&self, version: &MavenVersion) -> RepoError {
        RepoError::VersionAlreadyPublished {
            program: self.revision.program.to_string(),
            version: version.to_string(),
        }
    }
}

//! Local repository cache
//!
//! Resolves coordinates to files under a local Maven repository, fetching
//! through to the remote on a miss. Release archives never change once
//! published and are fetched at most once; SNAPSHOT archives float and are
//! re-validated when their local copy is older than the staleness window.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use m2cache_core::{Archive, Program, Revision};

use crate::config::Repository;
use crate::error::{RepoError, Result};
use crate::release::{ReleaseOptions, ReleaseTransaction};
use crate::store::MetadataStore;
use crate::transfer::ChecksumTransfer;

/// A local repository backed by one remote repository
pub struct RepositoryCache {
    root: PathBuf,
    transfer: Arc<ChecksumTransfer>,
    metadata: MetadataStore,
}

impl RepositoryCache {
    pub fn new(root: impl Into<PathBuf>, transfer: ChecksumTransfer, stale_time: Duration) -> Self {
        let root = root.into();
        let transfer = Arc::new(transfer);
        let metadata = MetadataStore::new(root.clone(), transfer.clone(), stale_time);
        Self {
            root,
            transfer,
            metadata,
        }
    }

    /// Open the cache of a configured repository
    pub fn open(repo: &Repository) -> Result<Self> {
        Ok(Self::new(
            repo.local_root()?,
            ChecksumTransfer::for_repository(repo)?,
            repo.stale_time,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn transfer(&self) -> &ChecksumTransfer {
        &self.transfer
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Released revisions of `program`, in metadata order
    pub async fn revisions(&self, program: &Program) -> Result<Vec<Revision>> {
        let Some(metadata) = self.metadata.program(program).await? else {
            return Ok(Vec::new());
        };
        Ok(metadata
            .versions
            .iter()
            .map(|v| program.version(v.clone()))
            .collect())
    }

    /// Resolved archives of every recorded snapshot build
    ///
    /// `None` for a release revision.
    pub async fn snapshot_archives(&self, revision: &Revision) -> Result<Option<Vec<Archive>>> {
        if !revision.is_snapshot() {
            return Ok(None);
        }
        let Some(metadata) = self.metadata.revision(revision).await? else {
            return Ok(Some(Vec::new()));
        };
        Ok(Some(
            metadata
                .snapshot_versions
                .iter()
                .map(|sv| {
                    revision
                        .archive(&sv.extension, sv.classifier.as_deref())
                        .with_resolved(sv.value.clone())
                })
                .collect(),
        ))
    }

    /// Bind a SNAPSHOT archive to the current build of its revision
    ///
    /// Archives that are already resolved, and snapshots without a recorded
    /// build, are returned unchanged.
    pub async fn resolve_snapshot(&self, archive: &Archive) -> Result<Archive> {
        if archive.is_resolved() {
            return Ok(archive.clone());
        }
        let resolved = self
            .metadata
            .revision(&archive.revision)
            .await?
            .and_then(|m| m.resolved_version(&archive.revision));
        Ok(match resolved {
            Some(version) => archive.with_resolved(version),
            None => archive.clone(),
        })
    }

    pub async fn resolved_archive(
        &self,
        revision: &Revision,
        extension: &str,
        classifier: Option<&str>,
    ) -> Result<Archive> {
        self.resolve_snapshot(&revision.archive(extension, classifier))
            .await
    }

    /// Local file of `archive`, fetched if needed
    ///
    /// `None` when the remote does not have it either.
    pub async fn get(&self, archive: &Archive) -> Result<Option<PathBuf>> {
        let archive = self.resolve_snapshot(archive).await?;
        let file = archive.local_path(&self.root);

        if !file.is_file() || (archive.is_snapshot() && self.metadata.is_stale(&file)) {
            self.transfer.fetch(&archive.path(), &file).await?;
        }

        Ok(file.is_file().then_some(file))
    }

    /// When `revision` last changed locally
    ///
    /// For a snapshot this is its metadata file, for a release its directory.
    pub async fn last_updated(&self, revision: &Revision) -> Result<Option<SystemTime>> {
        let path = if revision.is_snapshot() {
            self.root.join(revision.metadata_path())
        } else {
            self.root.join(revision.path())
        };
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.modified().map_err(|e| RepoError::io(&path, e))?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RepoError::io(&path, e)),
        }
    }

    /// Begin publishing `revision`
    pub fn release(&self, revision: &Revision, options: ReleaseOptions) -> Result<ReleaseTransaction<'_>> {
        ReleaseTransaction::open(self, revision.clone(), options)
    }
}

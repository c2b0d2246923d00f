//! Fetch-through cache of `maven-metadata.xml` documents
//!
//! Metadata is read from the local repository, refreshed from the remote when
//! the local file is missing or older than the staleness window, and kept in
//! memory keyed by identity. A failed refresh degrades to the last known
//! value instead of failing the caller.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use m2cache_core::{Program, ProgramMetadata, Revision, RevisionMetadata};

use crate::error::{IoResultExt, RepoError, Result};
use crate::transfer::ChecksumTransfer;

/// A metadata document with a parse/serialize pair
pub trait MetadataDocument: Sized {
    fn parse(bytes: &[u8]) -> m2cache_core::Result<Self>;
    fn serialize(&self) -> String;
}

impl MetadataDocument for ProgramMetadata {
    fn parse(bytes: &[u8]) -> m2cache_core::Result<Self> {
        ProgramMetadata::parse(bytes)
    }

    fn serialize(&self) -> String {
        ProgramMetadata::serialize(self)
    }
}

impl MetadataDocument for RevisionMetadata {
    fn parse(bytes: &[u8]) -> m2cache_core::Result<Self> {
        RevisionMetadata::parse(bytes)
    }

    fn serialize(&self) -> String {
        RevisionMetadata::serialize(self)
    }
}

/// In-memory entry, tagged with the modification time of its file
struct Cached<T> {
    value: Arc<T>,
    modified: SystemTime,
}

type CacheMap<K, T> = RwLock<HashMap<K, Cached<T>>>;

/// Program and Revision metadata of one repository
pub struct MetadataStore {
    root: PathBuf,
    transfer: Arc<ChecksumTransfer>,
    stale_time: Duration,
    programs: CacheMap<Program, ProgramMetadata>,
    revisions: CacheMap<Revision, RevisionMetadata>,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>, transfer: Arc<ChecksumTransfer>, stale_time: Duration) -> Self {
        Self {
            root: root.into(),
            transfer,
            stale_time,
            programs: RwLock::new(HashMap::new()),
            revisions: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    /// True when `path` is older than the staleness window
    ///
    /// A missing file is not stale, it is absent.
    pub fn is_stale(&self, path: &Path) -> bool {
        match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified
                .elapsed()
                .map(|age| age > self.stale_time)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Released versions of `program`, `None` if it was never published
    pub async fn program(&self, program: &Program) -> Result<Option<Arc<ProgramMetadata>>> {
        self.load(
            &self.programs,
            program,
            &program.metadata_path(),
            &program.to_string(),
        )
        .await
    }

    /// Snapshot history of `revision`, `None` if there is none
    pub async fn revision(&self, revision: &Revision) -> Result<Option<Arc<RevisionMetadata>>> {
        self.load(
            &self.revisions,
            revision,
            &revision.metadata_path(),
            &revision.to_string(),
        )
        .await
    }

    /// Write `metadata` to the local repository and make it current
    pub fn install_program(
        &self,
        program: &Program,
        metadata: ProgramMetadata,
    ) -> Result<Arc<ProgramMetadata>> {
        self.install(&self.programs, program, &program.metadata_path(), metadata)
    }

    pub fn install_revision(
        &self,
        revision: &Revision,
        metadata: RevisionMetadata,
    ) -> Result<Arc<RevisionMetadata>> {
        self.install(
            &self.revisions,
            revision,
            &revision.metadata_path(),
            metadata,
        )
    }

    async fn load<K, T>(
        &self,
        map: &CacheMap<K, T>,
        key: &K,
        remote_path: &str,
        identity: &str,
    ) -> Result<Option<Arc<T>>>
    where
        K: Eq + Hash + Clone,
        T: MetadataDocument,
    {
        let path = self.root.join(remote_path);
        let in_memory = || map.read().get(key).map(|c| c.value.clone());

        if !path.is_file() || self.is_stale(&path) {
            match self.transfer.fetch(remote_path, &path).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("No remote metadata for {}", identity);
                    if let Some(value) = in_memory() {
                        return Ok(Some(value));
                    }
                }
                Err(e @ RepoError::ChecksumMismatch { .. }) => return Err(e),
                Err(e) => {
                    if let Some(value) = in_memory() {
                        tracing::warn!("Using cached metadata for {}: {}", identity, e);
                        return Ok(Some(value));
                    }
                    if !path.is_file() {
                        return Err(RepoError::MetadataUnavailable {
                            identity: identity.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    tracing::warn!("Using stale metadata for {}: {}", identity, e);
                }
            }
        }

        if !path.is_file() {
            return Ok(None);
        }

        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .with_path(&path)?;
        if let Some(cached) = map.read().get(key) {
            if cached.modified == modified {
                return Ok(Some(cached.value.clone()));
            }
        }

        let Some(value) = read_document::<T>(&path)? else {
            return Ok(None);
        };
        let value = Arc::new(value);
        map.write().insert(
            key.clone(),
            Cached {
                value: value.clone(),
                modified,
            },
        );
        Ok(Some(value))
    }

    fn install<K, T>(
        &self,
        map: &CacheMap<K, T>,
        key: &K,
        relative_path: &str,
        metadata: T,
    ) -> Result<Arc<T>>
    where
        K: Eq + Hash + Clone,
        T: MetadataDocument,
    {
        let path = self.root.join(relative_path);
        write_atomically(&path, metadata.serialize().as_bytes())?;
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .with_path(&path)?;

        let value = Arc::new(metadata);
        map.write().insert(
            key.clone(),
            Cached {
                value: value.clone(),
                modified,
            },
        );
        Ok(value)
    }
}

/// Parse a metadata file, `None` if it does not exist
pub(crate) fn read_document<T: MetadataDocument>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RepoError::io(path, e)),
    };
    T::parse(&bytes)
        .map(Some)
        .map_err(|source| RepoError::InvalidMetadata {
            path: path.to_path_buf(),
            source,
        })
}

/// Replace `path` with `data` through a temporary file in the same directory
pub(crate) fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| RepoError::io(path, std::io::Error::other("path has no parent")))?;
    std::fs::create_dir_all(parent).with_path(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent).with_path(parent)?;
    temp.write_all(data).with_path(temp.path())?;
    temp.persist(path).map_err(|e| RepoError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpTransport;
    use crate::transfer::TransferPolicy;
    use m2cache_core::MavenVersion;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WIDGET_METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>com.acme</groupId>
  <artifactId>widget</artifactId>
  <versioning>
    <versions>
      <version>1.0</version>
      <version>1.1</version>
    </versions>
    <lastUpdated>20240101120000</lastUpdated>
  </versioning>
</metadata>
"#;

    const METADATA_PATH: &str = "/com/acme/widget/maven-metadata.xml";

    fn widget() -> Program {
        Program::new("com.acme", "widget").unwrap()
    }

    fn store(server: &MockServer, root: &Path, stale_time: Duration) -> MetadataStore {
        let transfer = ChecksumTransfer::new(
            HttpTransport::public().unwrap(),
            &server.uri(),
            TransferPolicy::immediate(),
        )
        .unwrap();
        MetadataStore::new(root, Arc::new(transfer), stale_time)
    }

    #[tokio::test]
    async fn test_fresh_metadata_is_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(WIDGET_METADATA))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store(&server, dir.path(), Duration::from_secs(3600));

        let first = store.program(&widget()).await.unwrap().unwrap();
        let second = store.program(&widget()).await.unwrap().unwrap();
        assert_eq!(first.versions.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(dir.path().join("com/acme/widget/maven-metadata.xml").is_file());
    }

    #[tokio::test]
    async fn test_stale_metadata_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(WIDGET_METADATA))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store(&server, dir.path(), Duration::ZERO);
        store.program(&widget()).await.unwrap();
        std::thread::sleep(Duration::from_millis(10));
        store.program(&widget()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unpublished_program() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = store(&server, dir.path(), Duration::from_secs(3600));
        assert!(store.program(&widget()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_memory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(WIDGET_METADATA))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store(&server, dir.path(), Duration::ZERO);
        let first = store.program(&widget()).await.unwrap().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        let second = store.program(&widget()).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_unavailable_without_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store(&server, dir.path(), Duration::from_secs(3600));
        let err = store.program(&widget()).await.unwrap_err();
        assert!(matches!(err, RepoError::MetadataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_install_replaces_current_value() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = store(&server, dir.path(), Duration::from_secs(3600));

        let mut metadata = ProgramMetadata::new(&widget());
        metadata.add_version(MavenVersion::new("2.0"));
        store.install_program(&widget(), metadata).unwrap();

        // the file is fresh, so no request reaches the server
        let loaded = store.program(&widget()).await.unwrap().unwrap();
        assert_eq!(loaded.versions, vec![MavenVersion::new("2.0")]);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_local_metadata() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("com/acme/widget/maven-metadata.xml");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "<project/>").unwrap();

        let store = store(&server, dir.path(), Duration::from_secs(3600));
        let err = store.program(&widget()).await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidMetadata { .. }));
    }
}

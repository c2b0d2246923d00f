//! Checksum-verified transfers
//!
//! Every file in a Maven repository is accompanied by `.sha1` and `.md5`
//! siblings. Downloads verify whichever of them the server provides and keep
//! the verified values next to the file; uploads publish both.

use futures::StreamExt;
use md5::Md5;
use reqwest::StatusCode;
use sha1::{Digest, Sha1};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::Repository;
use crate::error::{IoResultExt, RepoError, Result};
use crate::http::HttpTransport;

/// Retry behaviour of transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Retries of a failed download, on top of the first attempt
    pub fetch_retries: u32,
    /// Total attempts of an optimistic metadata update
    pub metadata_attempts: u32,
    /// Fixed pause between attempts
    pub retry_delay: Duration,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            fetch_retries: 3,
            metadata_attempts: 4,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl TransferPolicy {
    /// Default attempt counts without pauses
    pub fn immediate() -> Self {
        Self {
            retry_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Checksum kinds published next to every file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Sha1,
    Md5,
}

impl ChecksumKind {
    /// Suffix of the sibling file, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Md5 => "md5",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChecksumKind::Sha1 => "SHA-1",
            ChecksumKind::Md5 => "MD5",
        }
    }
}

/// `path` with `.suffix` appended to its file name
pub fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// GET/PUT/DELETE of repository paths with checksum siblings
///
/// Holds no mutable state; concurrent calls for different paths are safe.
#[derive(Clone)]
pub struct ChecksumTransfer {
    client: HttpTransport,
    base: String,
    policy: TransferPolicy,
}

impl ChecksumTransfer {
    pub fn new(client: HttpTransport, base_url: &str, policy: TransferPolicy) -> Result<Self> {
        let base = format!("{}/", base_url.trim_end_matches('/'));
        url::Url::parse(&base).map_err(|e| RepoError::InvalidRepositoryUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            base,
            policy,
        })
    }

    pub fn for_repository(repo: &Repository) -> Result<Self> {
        Self::new(
            HttpTransport::for_repository(repo)?,
            &repo.base_url(),
            repo.transfer_policy(),
        )
    }

    pub fn policy(&self) -> &TransferPolicy {
        &self.policy
    }

    /// Absolute URL of a repository-relative path
    pub fn url(&self, remote_path: &str) -> String {
        format!("{}{}", self.base, remote_path.trim_start_matches('/'))
    }

    /// Download `remote_path` into `dest`
    ///
    /// Returns `false` when the remote has no such resource. Transport
    /// failures and server errors are retried; checksum mismatches are not.
    pub async fn fetch(&self, remote_path: &str, dest: &Path) -> Result<bool> {
        let url = self.url(remote_path);
        retry(
            self.policy.fetch_retries + 1,
            self.policy.retry_delay,
            &url,
            RepoError::is_retryable,
            |_| self.fetch_once(&url, dest),
        )
        .await
    }

    async fn fetch_once(&self, url: &str, dest: &Path) -> Result<bool> {
        let etag = if dest.is_file() {
            std::fs::read_to_string(sidecar(dest, "etag"))
                .ok()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
        } else {
            None
        };

        let (response, sha1, md5) = futures::join!(
            self.client.get(url, etag.as_deref()),
            self.remote_checksum(url, ChecksumKind::Sha1),
            self.remote_checksum(url, ChecksumKind::Md5),
        );
        let response = response?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                tracing::debug!("{} not found", url);
                return Ok(false);
            }
            StatusCode::NOT_MODIFIED => {
                tracing::debug!("{} not modified", url);
                touch(dest)?;
                return Ok(true);
            }
            status => check_status(url, status)?,
        }

        let parent = dest.parent().ok_or_else(|| {
            RepoError::io(dest, std::io::Error::other("destination has no parent"))
        })?;
        std::fs::create_dir_all(parent).with_path(parent)?;

        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| chrono::DateTime::parse_from_rfc2822(v).ok())
            .map(SystemTime::from);
        let new_etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut temp = tempfile::NamedTempFile::new_in(parent).with_path(parent)?;
        let mut sha1_hasher = Sha1::new();
        let mut md5_hasher = Md5::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            sha1_hasher.update(&chunk);
            md5_hasher.update(&chunk);
            temp.write_all(&chunk).with_path(temp.path())?;
        }

        let verified = [
            (ChecksumKind::Sha1, sha1, hex::encode(sha1_hasher.finalize())),
            (ChecksumKind::Md5, md5, hex::encode(md5_hasher.finalize())),
        ];
        for (kind, expected, actual) in &verified {
            if let Some(expected) = expected {
                if expected != actual {
                    return Err(RepoError::ChecksumMismatch {
                        path: dest.to_path_buf(),
                        kind: kind.name(),
                        expected: expected.clone(),
                        actual: actual.clone(),
                    });
                }
            }
        }

        if let Some(time) = last_modified {
            temp.as_file().set_modified(time).with_path(temp.path())?;
        }
        temp.persist(dest).map_err(|e| RepoError::io(dest, e.error))?;

        if let Some(etag) = new_etag {
            let path = sidecar(dest, "etag");
            std::fs::write(&path, etag).with_path(&path)?;
        }
        for (kind, expected, actual) in verified {
            if expected.is_some() {
                let path = sidecar(dest, kind.extension());
                std::fs::write(&path, actual).with_path(&path)?;
            }
        }

        tracing::debug!("Fetched {} into {}", url, dest.display());
        Ok(true)
    }

    /// First token of a remote checksum file, if the server has one
    async fn remote_checksum(&self, url: &str, kind: ChecksumKind) -> Option<String> {
        let checksum_url = format!("{}.{}", url, kind.extension());
        let response = match self.client.get(&checksum_url, None).await {
            Ok(response) if response.status().is_success() => response,
            Ok(_) => return None,
            Err(e) => {
                tracing::debug!("Could not fetch {}: {}", checksum_url, e);
                return None;
            }
        };
        let text = response.text().await.ok()?;
        text.split_whitespace()
            .next()
            .map(|token| token.trim().to_ascii_lowercase())
    }

    /// Upload `local` to `remote_path` along with its checksums
    pub async fn store(&self, local: &Path, remote_path: &str) -> Result<()> {
        let data = tokio::fs::read(local).await.with_path(local)?;
        let sha1 = hex::encode(Sha1::digest(&data));
        let md5 = hex::encode(Md5::digest(&data));
        let url = self.url(remote_path);

        retry(
            self.policy.fetch_retries + 1,
            self.policy.retry_delay,
            &url,
            RepoError::is_transport_failure,
            |_| self.store_once(&url, &data, &sha1, &md5),
        )
        .await
    }

    /// Checksums follow the file only once the file itself was accepted
    async fn store_once(&self, url: &str, data: &[u8], sha1: &str, md5: &str) -> Result<()> {
        let status = self.client.put(url, data.to_vec()).await?.status();
        match status {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                futures::join!(
                    self.store_checksum(url, ChecksumKind::Sha1, sha1),
                    self.store_checksum(url, ChecksumKind::Md5, md5),
                );
                tracing::debug!("Stored {}", url);
                Ok(())
            }
            status => {
                check_status(url, status)?;
                Err(RepoError::RemoteRequestFailed {
                    url: url.to_string(),
                    status: status.as_u16(),
                })
            }
        }
    }

    async fn store_checksum(&self, url: &str, kind: ChecksumKind, value: &str) {
        let checksum_url = format!("{}.{}", url, kind.extension());
        match self.client.put(&checksum_url, value.as_bytes().to_vec()).await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => tracing::warn!(
                "Upload of {} returned HTTP {}",
                checksum_url,
                response.status().as_u16()
            ),
            Err(e) => tracing::warn!("Upload of {} failed: {}", checksum_url, e),
        }
    }

    /// Delete `remote_path` and, best effort, its checksums
    ///
    /// Returns `false` if the resource was already gone. The checksums are
    /// removed either way, they may outlive a half-finished upload.
    pub async fn delete(&self, remote_path: &str) -> Result<bool> {
        let url = self.url(remote_path);
        let status = self.client.delete(&url).await?.status();
        let existed = match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => false,
            status => {
                check_status(&url, status)?;
                true
            }
        };
        futures::join!(
            self.delete_checksum(&url, ChecksumKind::Sha1),
            self.delete_checksum(&url, ChecksumKind::Md5),
        );
        tracing::debug!("Deleted {}", url);
        Ok(existed)
    }

    async fn delete_checksum(&self, url: &str, kind: ChecksumKind) {
        let checksum_url = format!("{}.{}", url, kind.extension());
        if let Err(e) = self.client.delete(&checksum_url).await {
            tracing::warn!("Delete of {} failed: {}", checksum_url, e);
        }
    }
}

/// Map a non-success status to an error
fn check_status(url: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED => Err(RepoError::AuthRequired {
            url: url.to_string(),
        }),
        StatusCode::FORBIDDEN => Err(RepoError::AuthFailed {
            message: format!("Access denied to {}", url),
        }),
        status => Err(RepoError::RemoteRequestFailed {
            url: url.to_string(),
            status: status.as_u16(),
        }),
    }
}

fn touch(path: &Path) -> Result<()> {
    std::fs::File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(SystemTime::now()))
        .with_path(path)
}

/// Run `op` up to `attempts` times while it fails with a retryable error
///
/// `op` receives the 1-based attempt number.
pub(crate) async fn retry<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    what: &str,
    retryable: impl Fn(&RepoError) -> bool,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && retryable(&e) => {
                tracing::warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

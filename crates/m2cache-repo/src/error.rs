//! Error types for repository operations

use std::path::{Path, PathBuf};
use thiserror::Error;

use m2cache_core::CoreError;

/// Repository operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("Repository already exists: {name}")]
    RepositoryAlreadyExists { name: String },

    #[error("Invalid repository URL: {url} - {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("Invalid repository configuration: {message}")]
    InvalidConfig { message: String },

    #[error(transparent)]
    Coordinate(#[from] CoreError),

    // ============ Transport Errors ============
    #[error("Request to {url} failed with HTTP {status}")]
    RemoteRequestFailed { url: String, status: u16 },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Authentication required for {url}")]
    AuthRequired { url: String },

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("{kind} checksum mismatch for {}: remote {expected}, local {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        kind: &'static str,
        expected: String,
        actual: String,
    },

    // ============ Metadata Errors ============
    #[error("Metadata for {identity} is unavailable: {reason}")]
    MetadataUnavailable { identity: String, reason: String },

    #[error("Invalid metadata in {}: {source}", path.display())]
    InvalidMetadata { path: PathBuf, source: CoreError },

    // ============ Release Errors ============
    #[error("Revision {revision} already exists at {}", path.display())]
    RevisionAlreadyExists { revision: String, path: PathBuf },

    #[error("Version {version} of {program} is already published")]
    VersionAlreadyPublished { program: String, version: String },

    #[error("Invalid release of {revision}: {message}")]
    InvalidRelease { revision: String, message: String },

    // ============ IO Errors ============
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("File watch error: {message}")]
    Watch { message: String },
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        RepoError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Failures of the connection itself, worth repeating verbatim
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            RepoError::NetworkError { .. } | RepoError::Timeout { .. }
        )
    }

    /// Failures a fetch retries: transport failures and server-side errors.
    ///
    /// Checksum mismatches, authentication and local IO are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            RepoError::RemoteRequestFailed { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            other => other.is_transport_failure(),
        }
    }
}

/// Attach the path being operated on to an IO error
pub(crate) trait IoResultExt<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| RepoError::io(path, e))
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Timeout { seconds: 30 }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::RemoteRequestFailed {
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidRepositoryUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

impl From<notify::Error> for RepoError {
    fn from(e: notify::Error) -> Self {
        RepoError::Watch {
            message: e.to_string(),
        }
    }
}

//! Repository configuration management
//!
//! Stores repository configuration in `~/.config/m2cache/repositories.yaml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::credentials::Credentials;
use crate::error::{IoResultExt, RepoError, Result};
use crate::transfer::TransferPolicy;

/// Default staleness window of cached metadata
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Default pause between retries
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Repository configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Configured repositories
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

fn default_api_version() -> String {
    "m2cache/v1".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            repositories: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        for repo in &config.repositories {
            RepositoryConfig::check_url(&repo.url)?;
        }
        Ok(config)
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("m2cache").join("repositories.yaml"))
    }

    /// Get a repository by name
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Add a repository
    pub fn add(&mut self, repo: Repository) -> Result<()> {
        if self.get(&repo.name).is_some() {
            return Err(RepoError::RepositoryAlreadyExists {
                name: repo.name.clone(),
            });
        }
        self.repositories.push(repo);
        Ok(())
    }

    /// Remove a repository by name
    pub fn remove(&mut self, name: &str) -> Result<Repository> {
        let idx = self
            .repositories
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })?;
        Ok(self.repositories.remove(idx))
    }

    fn check_url(url: &str) -> Result<()> {
        let parsed = url::Url::parse(url).map_err(|e| RepoError::InvalidRepositoryUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(RepoError::InvalidRepositoryUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}', expected http or https", other),
            }),
        }
    }
}

/// A remote Maven repository and its local cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Unique name for this repository
    pub name: String,

    /// Repository base URL (HTTP(S))
    pub url: String,

    /// Local cache root (defaults to `~/.m2/repository`)
    #[serde(default)]
    pub local: Option<PathBuf>,

    /// Credentials sent to this repository
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// How long cached metadata is trusted before it is re-fetched
    #[serde(default = "default_stale_time", with = "humantime_serde")]
    pub stale_time: Duration,

    /// Pause between retried requests
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Skip TLS verification (insecure, not recommended)
    #[serde(default)]
    pub insecure_skip_tls: bool,
}

fn default_stale_time() -> Duration {
    DEFAULT_STALE_TIME
}

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

impl Repository {
    /// Create a new repository from URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        RepositoryConfig::check_url(&url)?;

        Ok(Self {
            name: name.into(),
            url,
            local: None,
            credentials: None,
            stale_time: DEFAULT_STALE_TIME,
            retry_delay: DEFAULT_RETRY_DELAY,
            insecure_skip_tls: false,
        })
    }

    /// Base URL with a trailing slash, ready to have paths appended
    pub fn base_url(&self) -> String {
        format!("{}/", self.url.trim_end_matches('/'))
    }

    /// Local cache root
    pub fn local_root(&self) -> Result<PathBuf> {
        if let Some(local) = &self.local {
            return Ok(local.clone());
        }
        let home = dirs::home_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine home directory".to_string(),
        })?;
        Ok(home.join(".m2").join("repository"))
    }

    /// Retry behaviour for transfers against this repository
    pub fn transfer_policy(&self) -> TransferPolicy {
        TransferPolicy {
            retry_delay: self.retry_delay,
            ..TransferPolicy::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_new() {
        let repo = Repository::new("central", "https://repo1.maven.org/maven2").unwrap();
        assert_eq!(repo.base_url(), "https://repo1.maven.org/maven2/");
        assert_eq!(repo.stale_time, DEFAULT_STALE_TIME);
        assert_eq!(repo.transfer_policy().fetch_retries, 3);

        assert!(Repository::new("bad", "ftp://example.com").is_err());
        assert!(Repository::new("bad", "not a url").is_err());
    }

    #[test]
    fn test_local_root_override() {
        let mut repo = Repository::new("central", "https://repo1.maven.org/maven2/").unwrap();
        repo.local = Some(PathBuf::from("/var/cache/m2"));
        assert_eq!(repo.local_root().unwrap(), PathBuf::from("/var/cache/m2"));
    }

    #[test]
    fn test_config_add_remove() {
        let mut config = RepositoryConfig::default();

        let repo = Repository::new("test", "https://example.com").unwrap();
        config.add(repo).unwrap();

        assert!(config.get("test").is_some());
        assert!(
            config
                .add(Repository::new("test", "https://other.com").unwrap())
                .is_err()
        );

        let removed = config.remove("test").unwrap();
        assert_eq!(removed.name, "test");
        assert!(config.get("test").is_none());
        assert!(config.remove("test").is_err());
    }

    #[test]
    fn test_config_yaml() {
        let yaml = r#"
repositories:
  - name: internal
    url: https://nexus.example.com/repository/maven-releases
    local: /srv/m2
    staleTime: 1h
    retryDelay: 250ms
    credentials:
      type: basic
      username: ci
      password: secret
"#;
        let config: RepositoryConfig = serde_yaml::from_str(yaml).unwrap();
        let repo = config.get("internal").unwrap();
        assert_eq!(repo.stale_time, Duration::from_secs(3600));
        assert_eq!(repo.transfer_policy().retry_delay, Duration::from_millis(250));
        assert_eq!(repo.credentials, Some(Credentials::basic("ci", "secret")));
        assert_eq!(config.api_version, "m2cache/v1");
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("repositories.yaml");

        let mut config = RepositoryConfig::default();
        config
            .add(Repository::new("central", "https://repo1.maven.org/maven2").unwrap())
            .unwrap();
        config.save_to(&path).unwrap();

        let loaded = RepositoryConfig::load_from(&path).unwrap();
        assert_eq!(loaded.repositories.len(), 1);
        assert_eq!(loaded.repositories[0].stale_time, DEFAULT_STALE_TIME);
    }
}

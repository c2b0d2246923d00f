//! CLI commands

use std::path::PathBuf;

use m2cache_repo::{Repository, RepositoryCache, RepositoryConfig};

use crate::error::{CliError, Result};

pub mod get;
pub mod versions;
pub mod snapshots;
pub mod release;
pub mod watch;
pub mod repo;

/// Repository selection shared by every command
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub repo: Option<String>,
    pub url: Option<String>,
    pub local: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl Target {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(RepositoryConfig::default_path()?),
        }
    }

    /// Load repositories.yaml, or an empty configuration if it does not exist yet
    pub fn load_config(&self) -> Result<RepositoryConfig> {
        let path = self.config_path()?;
        if path.exists() {
            Ok(RepositoryConfig::load_from(&path)?)
        } else {
            Ok(RepositoryConfig::default())
        }
    }

    pub fn save_config(&self, config: &RepositoryConfig) -> Result<()> {
        Ok(config.save_to(&self.config_path()?)?)
    }

    /// The repository to work against
    ///
    /// `--url` wins over `--repo`; without either the first configured
    /// repository is used. `--local` overrides the cache root.
    pub fn repository(&self) -> Result<Repository> {
        let mut repository = match (&self.url, &self.repo) {
            (Some(url), _) => Repository::new("command-line", url.as_str())?,
            (None, Some(name)) => {
                let config = self.load_config()?;
                config.get(name).cloned().ok_or_else(|| {
                    CliError::from(m2cache_repo::RepoError::RepositoryNotFound {
                        name: name.clone(),
                    })
                })?
            }
            (None, None) => {
                let config = self.load_config()?;
                config.repositories.into_iter().next().ok_or_else(|| {
                    CliError::input_with_help(
                        "No repository selected",
                        "Pass --url, or add one with 'm2cache repo add <name> <url>'",
                    )
                })?
            }
        };

        if let Some(local) = &self.local {
            repository.local = Some(local.clone());
        }
        Ok(repository)
    }

    pub fn open_cache(&self) -> Result<RepositoryCache> {
        let repository = self.repository()?;
        tracing::debug!(repository = %repository.name, url = %repository.url, "opening cache");
        Ok(RepositoryCache::open(&repository)?)
    }
}

//! Repository management commands

use std::path::PathBuf;

use console::style;

use m2cache_repo::{Credentials, Repository};

use super::Target;
use crate::error::{CliError, Result};

/// Add a new repository
pub fn add(
    target: &Target,
    name: &str,
    url: &str,
    local: Option<PathBuf>,
    username: Option<&str>,
    password: Option<&str>,
    token: Option<&str>,
) -> Result<()> {
    let mut config = target.load_config()?;
    let mut repo = Repository::new(name, url)?;
    repo.local = local;

    repo.credentials = match (token, username, password) {
        (Some(token), None, None) => Some(Credentials::bearer(token)),
        (None, Some(user), Some(pass)) => Some(Credentials::basic(user, pass)),
        (None, None, None) => None,
        _ => {
            return Err(CliError::input(
                "Please provide both username and password, or a token",
            ));
        }
    };

    config.add(repo)?;
    target.save_config(&config)?;

    println!("\"{}\" has been added to your repositories", name);
    Ok(())
}

/// List configured repositories
pub fn list(target: &Target) -> Result<()> {
    let config = target.load_config()?;

    if config.repositories.is_empty() {
        println!("No repositories configured.");
        println!();
        println!("Add one with: m2cache repo add <name> <url>");
        return Ok(());
    }

    println!("{:<20} {:<50} {}", "NAME", "URL", "LOCAL");
    println!("{}", "-".repeat(90));

    for repo in &config.repositories {
        let local = repo
            .local_root()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "-".to_string());
        let auth = if repo.credentials.is_some() {
            style(" (authenticated)").dim().to_string()
        } else {
            String::new()
        };
        println!("{:<20} {:<50} {}{}", repo.name, repo.url, local, auth);
    }

    Ok(())
}

/// Remove a repository
pub fn remove(target: &Target, name: &str) -> Result<()> {
    let mut config = target.load_config()?;
    config.remove(name)?;
    target.save_config(&config)?;

    println!("\"{}\" has been removed from your repositories", name);
    Ok(())
}

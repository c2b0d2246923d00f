//! Get command - resolve a coordinate to a file in the local cache

use m2cache_core::Archive;

use super::Target;
use crate::error::{CliError, Result};

/// Print the local path of an archive, fetching it first if needed
pub async fn run(target: &Target, coordinate: &str) -> Result<()> {
    let archive: Archive = coordinate.parse()?;
    let cache = target.open_cache()?;

    match cache.get(&archive).await? {
        Some(file) => {
            println!("{}", file.display());
            Ok(())
        }
        None => Err(CliError::not_found(format!(
            "{} was not found in {}",
            archive,
            cache.transfer().url(&archive.path())
        ))),
    }
}

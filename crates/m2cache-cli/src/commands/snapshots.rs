//! Snapshots command - list the archives of the current SNAPSHOT build

use console::style;

use m2cache_core::Revision;

use super::Target;
use crate::error::{CliError, Result};

pub async fn run(target: &Target, coordinate: &str) -> Result<()> {
    let revision: Revision = coordinate.parse()?;
    let cache = target.open_cache()?;

    let Some(archives) = cache.snapshot_archives(&revision).await? else {
        return Err(CliError::input_with_help(
            format!("{} is not a SNAPSHOT version", revision),
            "Use 'm2cache versions' to list released versions",
        ));
    };

    if archives.is_empty() {
        return Err(CliError::not_found(format!(
            "No snapshot builds of {} published",
            revision
        )));
    }

    println!("{}", style(&revision).bold());
    for archive in &archives {
        println!("  {:<50} {}", archive.to_string(), style(archive.file_name()).dim());
    }
    Ok(())
}

//! Release command - publish files as the archives of one revision

use std::path::{Path, PathBuf};

use chrono::Utc;
use console::style;

use m2cache_core::{Archive, Revision, RevisionMetadata};
use m2cache_repo::{ReleaseOptions, ReleaseOutcome, RepositoryCache};

use super::Target;
use crate::error::{CliError, Result};

pub async fn run(
    target: &Target,
    coordinate: &str,
    files: &[PathBuf],
    force: bool,
    local_only: bool,
) -> Result<()> {
    let revision: Revision = coordinate.parse()?;
    let archives = files
        .iter()
        .map(|file| Ok((archive_for(&revision, file)?, file)))
        .collect::<Result<Vec<_>>>()?;

    let cache = target.open_cache()?;
    let mut tx = cache.release(&revision, ReleaseOptions { force, local_only })?;
    if revision.is_snapshot() {
        let build = next_build(&cache, &revision, local_only).await?;
        tx.set_build(Utc::now(), build)?;
    }

    for (archive, file) in &archives {
        let mut content = std::fs::File::open(file).map_err(|e| CliError::Io {
            message: format!("{}: {}", file.display(), e),
        })?;
        tx.add(archive, &mut content)?;
    }

    let published = tx.published_version();
    match tx.close().await? {
        ReleaseOutcome::Committed => println!(
            "{} Released {}:{} to {}",
            style("✓").green().bold(),
            revision.program,
            published,
            cache.transfer().url("")
        ),
        ReleaseOutcome::LocalOnly => println!(
            "{} Released {}:{} in {}",
            style("✓").green().bold(),
            revision.program,
            published,
            cache.root().display()
        ),
        ReleaseOutcome::Aborted => println!("Release of {} aborted", revision),
    }
    for (archive, _) in &archives {
        println!("  {} {}", style("→").blue(), archive);
    }
    Ok(())
}

/// The build number the next snapshot of `revision` gets
async fn next_build(cache: &RepositoryCache, revision: &Revision, local_only: bool) -> Result<u32> {
    let current = if local_only {
        let path = cache.root().join(revision.metadata_path());
        match std::fs::read(&path) {
            Ok(bytes) => Some(RevisionMetadata::parse(&bytes)?.snapshot.build_number),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        }
    } else {
        cache
            .metadata()
            .revision(revision)
            .await?
            .map(|metadata| metadata.snapshot.build_number)
    };
    Ok(current.map_or(1, |n| n + 1))
}

/// Infer the archive a file holds from its name
///
/// Files are named `artifact-version[-classifier].extension`.
fn archive_for(revision: &Revision, file: &Path) -> Result<Archive> {
    let invalid = |name: &str| {
        CliError::input_with_help(
            format!("Cannot tell which archive of {} '{}' is", revision, name),
            format!(
                "Name files {}-{}[-classifier].extension",
                revision.program.artifact, revision.version
            ),
        )
    };

    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| invalid(&file.display().to_string()))?;
    let prefix = format!("{}-{}", revision.program.artifact, revision.version);
    let rest = name.strip_prefix(&prefix).ok_or_else(|| invalid(name))?;

    let (classifier, extension) = if let Some(rest) = rest.strip_prefix('-') {
        match rest.split_once('.') {
            Some((classifier, extension)) if !classifier.is_empty() => {
                (Some(classifier), extension)
            }
            _ => return Err(invalid(name)),
        }
    } else if let Some(extension) = rest.strip_prefix('.') {
        (None, extension)
    } else {
        return Err(invalid(name));
    };

    if extension.is_empty() {
        return Err(invalid(name));
    }
    Ok(revision.archive(extension, classifier))
}

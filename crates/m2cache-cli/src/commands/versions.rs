//! Versions command - list the released revisions of a program

use console::style;
use serde::Serialize;

use m2cache_core::Program;

use super::Target;
use crate::error::{CliError, Result};

#[derive(Serialize)]
struct VersionsReport {
    program: String,
    latest: Option<String>,
    release: Option<String>,
    versions: Vec<String>,
}

pub async fn run(target: &Target, coordinate: &str, json: bool) -> Result<()> {
    let program: Program = coordinate.parse()?;
    let cache = target.open_cache()?;

    let revisions = cache.revisions(&program).await?;
    let metadata = cache.metadata().program(&program).await?;

    let report = VersionsReport {
        program: program.to_string(),
        latest: metadata
            .as_ref()
            .and_then(|m| m.latest.as_ref())
            .map(|v| v.to_string()),
        release: metadata
            .as_ref()
            .and_then(|m| m.release.as_ref())
            .map(|v| v.to_string()),
        versions: revisions.iter().map(|r| r.version.to_string()).collect(),
    };

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::internal(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    if report.versions.is_empty() {
        println!("No versions of {} published.", style(&report.program).cyan());
        return Ok(());
    }

    println!("{}", style(&report.program).bold());
    for version in &report.versions {
        let marker = if report.release.as_deref() == Some(version.as_str()) {
            style("(release)").green().to_string()
        } else if report.latest.as_deref() == Some(version.as_str()) {
            style("(latest)").yellow().to_string()
        } else {
            String::new()
        };
        println!("  {} {}", version, marker);
    }
    Ok(())
}

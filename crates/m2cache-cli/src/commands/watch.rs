//! Watch command - follow the revisions present in the local repository

use console::style;
use tokio::sync::mpsc;

use m2cache_repo::{DirectoryWatcher, LocalPrograms, WatchControl};

use super::Target;
use crate::error::{CliError, Result};

pub async fn run(target: &Target) -> Result<()> {
    let root = target.repository()?.local_root()?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let watcher = DirectoryWatcher::start(root.clone(), move || {
        if tx.send(()).is_ok() {
            WatchControl::Continue
        } else {
            WatchControl::Stop
        }
    })?;

    println!(
        "Watching {} {}",
        style(root.display()).cyan(),
        style("(Ctrl-C to stop)").dim()
    );
    print_index(&watcher.local_programs());

    loop {
        tokio::select! {
            changed = rx.recv() => {
                if changed.is_none() {
                    break;
                }
                print_index(&watcher.local_programs());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // close joins the watcher thread
    tokio::task::spawn_blocking(move || watcher.close())
        .await
        .map_err(|e| CliError::internal(format!("watcher shutdown failed: {}", e)))?;
    Ok(())
}

fn print_index(programs: &LocalPrograms) {
    println!();
    if programs.is_empty() {
        println!("{}", style("No revisions found.").dim());
        return;
    }
    for (program, revisions) in programs {
        let versions: Vec<_> = revisions.iter().map(|r| r.version.to_string()).collect();
        println!("{} {}", style(program).bold(), versions.join(", "));
    }
}

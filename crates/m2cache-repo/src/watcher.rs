//! Local repository watcher
//!
//! Keeps a live index of the revisions present in a local repository tree and
//! tells a listener when it changes. A revision directory is recognised by its
//! POM (`pom.xml`, or `{artifact}-*.pom` as laid out by Maven), and the
//! watcher does not descend below one: build output inside a project is not
//! interesting.
//!
//! The listener is called immediately for every POM that appears or
//! disappears, and once more when the tree has been quiet for the coalescing
//! window, so a burst of writes settles into a single trailing notification.

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use m2cache_core::{Program, Revision};

use crate::error::{IoResultExt, RepoError, Result};

/// Listener verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchControl {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
}

/// A change to one path inside a registered directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::Created,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::Deleted,
        }
    }
}

/// Source of filesystem events for individually registered directories
pub trait WatchService: Send + 'static {
    /// Report changes to the direct children of `dir`
    fn register(&mut self, dir: &Path) -> Result<()>;

    /// Wait up to `timeout` for events; an empty batch means none arrived
    fn poll(&mut self, timeout: Duration) -> Result<Vec<WatchEvent>>;
}

/// [`WatchService`] backed by the platform watcher
pub struct NotifyWatchService {
    watcher: RecommendedWatcher,
    events: Receiver<notify::Result<notify::Event>>,
}

impl NotifyWatchService {
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )?;
        Ok(Self {
            watcher,
            events: rx,
        })
    }

    fn convert(res: notify::Result<notify::Event>, out: &mut Vec<WatchEvent>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("File watch error: {}", e);
                return;
            }
        };
        let kind = match event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                WatchEventKind::Created
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                WatchEventKind::Deleted
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                // paths are [from, to]
                let mut paths = event.paths.into_iter();
                if let Some(from) = paths.next() {
                    out.push(WatchEvent::deleted(from));
                }
                if let Some(to) = paths.next() {
                    out.push(WatchEvent::created(to));
                }
                return;
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // backends that cannot tell the direction of a rename
                out.extend(event.paths.into_iter().map(|path| {
                    if path.exists() {
                        WatchEvent::created(path)
                    } else {
                        WatchEvent::deleted(path)
                    }
                }));
                return;
            }
            EventKind::Modify(_) => WatchEventKind::Modified,
            _ => return,
        };
        out.extend(event.paths.into_iter().map(|path| WatchEvent { path, kind }));
    }
}

impl WatchService for NotifyWatchService {
    fn register(&mut self, dir: &Path) -> Result<()> {
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| RepoError::Watch {
                message: format!("Failed to watch {}: {}", dir.display(), e),
            })
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<WatchEvent>> {
        let first = match self.events.recv_timeout(timeout) {
            Ok(res) => res,
            Err(RecvTimeoutError::Timeout) => return Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(RepoError::Watch {
                    message: "event channel closed".to_string(),
                });
            }
        };

        let mut out = Vec::new();
        Self::convert(first, &mut out);
        for res in self.events.try_iter() {
            Self::convert(res, &mut out);
        }
        Ok(out)
    }
}

/// In-memory [`WatchService`] fed through a [`MemoryWatchHandle`]
///
/// Lets the indexing and coalescing logic run without relying on the timing
/// of a real filesystem watcher.
pub struct MemoryWatchService {
    events: Receiver<WatchEvent>,
    registered: Arc<Mutex<Vec<PathBuf>>>,
}

/// Cloneable handle that injects events into a [`MemoryWatchService`]
#[derive(Clone)]
pub struct MemoryWatchHandle {
    sender: Sender<WatchEvent>,
    registered: Arc<Mutex<Vec<PathBuf>>>,
}

impl MemoryWatchService {
    pub fn new() -> (Self, MemoryWatchHandle) {
        let (sender, events) = mpsc::channel();
        let registered = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events,
                registered: registered.clone(),
            },
            MemoryWatchHandle { sender, registered },
        )
    }
}

impl MemoryWatchHandle {
    /// Inject an event; ignored once the service is gone
    pub fn push(&self, event: WatchEvent) {
        let _ = self.sender.send(event);
    }

    /// Directories registered so far
    pub fn registered(&self) -> Vec<PathBuf> {
        self.registered.lock().clone()
    }
}

impl WatchService for MemoryWatchService {
    fn register(&mut self, dir: &Path) -> Result<()> {
        self.registered.lock().push(dir.to_path_buf());
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<WatchEvent>> {
        match self.events.recv_timeout(timeout) {
            Ok(first) => {
                let mut out = vec![first];
                out.extend(self.events.try_iter());
                Ok(out)
            }
            Err(RecvTimeoutError::Timeout) => Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(Vec::new())
            }
        }
    }
}

/// Timing of the watch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Upper bound of a single wait for events
    pub poll_timeout: Duration,
    /// Quiet period after the last event before the trailing notification
    pub coalesce_window: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(500),
            coalesce_window: Duration::from_millis(2000),
        }
    }
}

/// Revisions found under the root, by program
pub type LocalPrograms = BTreeMap<Program, BTreeSet<Revision>>;

struct Shared {
    root: PathBuf,
    index: Mutex<LocalPrograms>,
    closed: AtomicBool,
}

impl Shared {
    /// The revision whose directory is `dir`
    ///
    /// The last two segments below the root are artifact and version, the
    /// ones before them the group.
    fn revision_of(&self, dir: &Path) -> Option<Revision> {
        let relative = dir.strip_prefix(&self.root).ok()?;
        let segments: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        if segments.len() < 3 || segments.iter().any(|s| s.starts_with('.')) {
            return None;
        }
        let (group, rest) = segments.split_at(segments.len() - 2);
        let program = Program::new(group.join("."), rest[0]).ok()?;
        Some(program.version(rest[1]))
    }

    /// The revision `file` marks, if it is a POM
    fn marked_revision(&self, file: &Path) -> Option<Revision> {
        let name = file.file_name()?.to_str()?;
        let revision = self.revision_of(file.parent()?)?;
        let artifact_prefix = format!("{}-", revision.program.artifact);
        if name == "pom.xml" || (name.ends_with(".pom") && name.starts_with(&artifact_prefix)) {
            Some(revision)
        } else {
            None
        }
    }

    fn has_marker(&self, dir: &Path) -> bool {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return false;
        };
        entries.filter_map(|e| e.ok()).any(|e| {
            e.file_type().is_ok_and(|t| t.is_file()) && self.marked_revision(&e.path()).is_some()
        })
    }

    fn add(&self, revision: Revision) -> bool {
        self.index
            .lock()
            .entry(revision.program.clone())
            .or_default()
            .insert(revision)
    }

    fn remove(&self, revision: &Revision) -> bool {
        let mut index = self.index.lock();
        let Some(revisions) = index.get_mut(&revision.program) else {
            return false;
        };
        let removed = revisions.remove(revision);
        if revisions.is_empty() {
            index.remove(&revision.program);
        }
        removed
    }

    /// Drop every revision at or below `dir`
    fn remove_below(&self, dir: &Path) -> bool {
        let mut index = self.index.lock();
        let before: usize = index.values().map(BTreeSet::len).sum();
        for revisions in index.values_mut() {
            revisions.retain(|r| !self.root.join(r.path()).starts_with(dir));
        }
        index.retain(|_, revisions| !revisions.is_empty());
        let after: usize = index.values().map(BTreeSet::len).sum();
        before != after
    }

    /// Register `dir` and its subdirectories, indexing revisions found
    ///
    /// Returns true if any revision was added.
    fn scan(&self, service: &mut dyn WatchService, dir: &Path) -> Result<bool> {
        let mut found = false;
        let mut walker = WalkDir::new(dir).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.path() != self.root && is_hidden(entry.path()) {
                walker.skip_current_dir();
                continue;
            }

            service.register(entry.path())?;
            if self.has_marker(entry.path()) {
                if let Some(revision) = self.revision_of(entry.path()) {
                    found |= self.add(revision);
                }
                walker.skip_current_dir();
            }
        }
        Ok(found)
    }

    /// Apply one event to the index
    ///
    /// Returns true when listeners must hear about it right away: a marker
    /// file came or went, or a directory change altered the index.
    fn apply(&self, service: &mut dyn WatchService, event: &WatchEvent) -> Result<bool> {
        match event.kind {
            WatchEventKind::Modified => Ok(false),
            WatchEventKind::Created if event.path.is_dir() => {
                if is_hidden(&event.path) {
                    return Ok(false);
                }
                self.scan(service, &event.path)
            }
            WatchEventKind::Created => match self.marked_revision(&event.path) {
                Some(revision) => {
                    self.add(revision);
                    Ok(true)
                }
                None => Ok(false),
            },
            WatchEventKind::Deleted => match self.marked_revision(&event.path) {
                Some(revision) => {
                    // another marker keeps the revision
                    let still_marked = event.path.parent().is_some_and(|dir| self.has_marker(dir));
                    if !still_marked {
                        self.remove(&revision);
                    }
                    Ok(true)
                }
                None => Ok(self.remove_below(&event.path)),
            },
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Watches a local repository tree on a background thread
pub struct DirectoryWatcher {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DirectoryWatcher {
    /// Watch `root` with the platform watcher and default timing
    pub fn start<F>(root: impl Into<PathBuf>, on_change: F) -> Result<Self>
    where
        F: FnMut() -> WatchControl + Send + 'static,
    {
        Self::start_with(
            root,
            NotifyWatchService::new()?,
            WatcherConfig::default(),
            on_change,
        )
    }

    /// Scan `root`, then watch it on a dedicated thread
    pub fn start_with<S, F>(
        root: impl Into<PathBuf>,
        mut service: S,
        config: WatcherConfig,
        on_change: F,
    ) -> Result<Self>
    where
        S: WatchService,
        F: FnMut() -> WatchControl + Send + 'static,
    {
        let root = root.into();
        let shared = Arc::new(Shared {
            root: root.clone(),
            index: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        });
        shared.scan(&mut service, &root)?;
        tracing::debug!(
            "Watching {} ({} programs)",
            root.display(),
            shared.index.lock().len()
        );

        let loop_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("m2cache-watcher".to_string())
            .spawn(move || watch_loop(loop_shared, service, config, on_change))
            .with_path(&root)?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Snapshot of the revision index
    pub fn local_programs(&self) -> LocalPrograms {
        self.shared.index.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop watching and release the platform watcher
    ///
    /// Idempotent. Waits for the watch thread unless called from it.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if thread.thread().id() != std::thread::current().id() && thread.join().is_err() {
            tracing::warn!("Watcher thread for {} panicked", self.shared.root.display());
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn watch_loop<S, F>(shared: Arc<Shared>, mut service: S, config: WatcherConfig, mut on_change: F)
where
    S: WatchService,
    F: FnMut() -> WatchControl,
{
    let mut settle_at: Option<Instant> = None;

    'watch: while !shared.closed.load(Ordering::Acquire) {
        let events = match service.poll(config.poll_timeout) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("Stopped watching {}: {}", shared.root.display(), e);
                break;
            }
        };

        if events.is_empty() {
            if settle_at.is_some_and(|at| Instant::now() >= at) {
                settle_at = None;
                if on_change() == WatchControl::Stop {
                    break;
                }
            }
            continue;
        }

        for event in &events {
            settle_at = Some(Instant::now() + config.coalesce_window);
            match shared.apply(&mut service, event) {
                Ok(true) => {
                    tracing::debug!("Revision marker changed: {}", event.path.display());
                    if on_change() == WatchControl::Stop {
                        break 'watch;
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Could not follow {}: {}", event.path.display(), e),
            }
        }
    }

    shared.closed.store(true, Ordering::Release);
}

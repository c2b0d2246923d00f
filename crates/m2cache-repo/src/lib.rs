//! m2cache Repository Cache
//!
//! This crate turns Maven coordinates into files on disk, fetched once from a
//! remote repository and served from a local repository afterwards:
//!
//! - **Checksum-verified transfers**: every download is checked against the
//!   server's `.sha1`/`.md5` files, every upload publishes them
//! - **Metadata store**: `maven-metadata.xml` cached in memory and on disk,
//!   refreshed after a staleness window, falling back to the last known copy
//! - **SNAPSHOT resolution**: floating versions bound to their current build
//! - **Release transactions**: staged, all-or-nothing publishing with
//!   optimistic metadata updates
//! - **Directory watcher**: a live index of the revisions in a local tree
//!
//! ## Example
//!
//! ```rust,no_run
//! use m2cache_core::Program;
//! use m2cache_repo::{Repository, RepositoryCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Repository::new("central", "https://repo1.maven.org/maven2")?;
//! let cache = RepositoryCache::open(&repo)?;
//!
//! let program = Program::new("com.acme", "widget")?;
//! for revision in cache.revisions(&program).await? {
//!     let jar = revision.archive("jar", None);
//!     if let Some(file) = cache.get(&jar).await? {
//!         println!("{}", file.display());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Notes
//!
//! - Credentials are NEVER sent after cross-origin redirects
//! - A checksum mismatch is never retried and leaves no file behind

pub mod error;
pub mod config;
pub mod credentials;
pub mod http;
pub mod transfer;
pub mod store;
pub mod cache;
pub mod release;
pub mod watcher;

// Re-exports for convenience
pub use error::{RepoError, Result};
pub use config::{Repository, RepositoryConfig};
pub use credentials::{Credentials, ResolvedCredentials};
pub use http::HttpTransport;
pub use transfer::{ChecksumKind, ChecksumTransfer, TransferPolicy};
pub use store::MetadataStore;
pub use cache::RepositoryCache;
pub use release::{ReleaseOptions, ReleaseOutcome, ReleaseTransaction};
pub use watcher::{
    DirectoryWatcher, LocalPrograms, MemoryWatchHandle, MemoryWatchService, NotifyWatchService,
    WatchControl, WatchEvent, WatchEventKind, WatchService, WatcherConfig,
};

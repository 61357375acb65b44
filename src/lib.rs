//! # fileguard - Pin a file to a trusted backup
//!
//! Watches a single file and restores it from a trusted backup the moment its
//! content diverges, using an atomic rename so the file is never observed
//! half-written.
//!
//! ## Overview
//!
//! Some external process keeps overwriting a file you want to stay exactly as
//! it is: a configuration file, a game asset, a pinned binary. fileguard:
//! - Creates a backup of the file on first run (or uses the one you point it at)
//! - Records the backup's SHA-256 as the ground truth
//! - Verifies the file at startup and restores it if needed
//! - Watches the file's directory for change notifications, or polls when the
//!   platform has no notification backend
//! - Restores the file atomically on every divergence, or only once if asked
//!
//! ## Architecture
//!
//! - **Snapshots**: `stat`-level identity (device, inode, mtime, size) compared
//!   without reading content, so the vast majority of triggers cost one `stat`
//! - **Content digests**: SHA-256 computed only when the identity moved
//! - **Atomic restore**: backup streamed into a temp file in the target's
//!   directory, verified against the recorded digest, then renamed over the target
//! - **Watch strategies**: event-driven or polling, chosen once per run
//! - **Serialized passes**: each detect-and-restore pass runs under one mutex
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fileguard::FileGuardBuilder;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> fileguard::Result<()> {
//! let guard = FileGuardBuilder::new()
//!     .only_once(false)
//!     .build("game/pakchunk0.pak")?;
//!
//! let token = CancellationToken::new();
//! let summary = guard.run(token).await?;
//! println!("{} restores", summary.restores);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, GuardError>`. Errors that only spoil one
//! pass (the target vanished mid-read, or the restored copy could not be
//! written next to it) are [recoverable](GuardError::is_recoverable)
//! and retried on the next trigger; a missing or corrupted backup ends the run.
//!
//! ## Module Organization
//!
//! - [`guard`]: Controller, lifecycle and builder
//! - [`detector`]: Two-tier change detection
//! - [`restore`]: Atomic restore and staging cleanup
//! - [`watcher`]: Event-driven and polling trigger sources
//! - [`backup`]: The trusted reference and its digest
//! - [`snapshot`]: Cheap file identity
//! - [`manifest`]: JSON file manifests (MD5 + size)
//! - [`types`]: Configuration and report types
//! - [`error`]: Error types and handling

pub mod backup;
pub mod detector;
pub mod error;
pub mod guard;
pub mod manifest;
pub mod restore;
pub mod snapshot;
pub mod types;
pub mod watcher;

mod utils;

pub use backup::BackupReference;
pub use detector::ChangeDetector;
pub use error::{GuardError, Result};
pub use guard::{FileGuard, FileGuardBuilder, GuardState};
pub use restore::RestoreEngine;
pub use snapshot::{FileIdentity, FileSnapshot};
pub use types::*;
pub use watcher::{EventWatcher, PollingWatcher, TriggerSource, Watcher};

/// Hash a file's content the way the guard does (SHA-256, lowercase hex)
pub fn content_digest(path: &std::path::Path) -> Result<String> {
    Ok(utils::hash_file_content(path)?)
}

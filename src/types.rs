//! Core data types shared across the guard
//!
//! This module contains the configuration of a guard instance and the
//! values the detection and restore passes report back to the caller.
//!
//! ## Overview
//!
//! - **Configuration**: `GuardConfig`, `WatchMode`
//! - **Detection**: `CheckOutcome`, `Divergence`, `Trigger`
//! - **Reporting**: `RestoreReport`, `PassReport`, `RunSummary`, `StopReason`
//!
//! ## Examples
//!
//! ```rust
//! use fileguard::types::{CheckOutcome, Divergence};
//!
//! let outcome = CheckOutcome::Tampered(Divergence::Missing);
//! assert!(outcome.is_tampered());
//! assert!(!CheckOutcome::MetadataOnly.is_tampered());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Suffix appended to the target's file name to form the default backup path
pub const DEFAULT_BACKUP_SUFFIX: &str = ".guardbak";

/// Polling interval used when no event backend is available
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How the watch loop is triggered
///
/// The strategy is resolved once when the watch loop starts and never
/// changes for the rest of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Use file system notifications when the platform supports them, else poll
    #[default]
    Auto,
    /// Require file system notifications
    Events,
    /// Re-check on a fixed interval
    Poll,
}

/// Configuration of a single guard instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Absolute path of the protected file
    pub target: PathBuf,
    /// Absolute path of the trusted reference copy
    pub backup: PathBuf,
    /// Interval between checks in polling mode
    pub poll_interval: Duration,
    /// Stop after the first successful restore
    pub only_once: bool,
    /// Trigger strategy for the watch loop
    pub watch_mode: WatchMode,
}

impl GuardConfig {
    /// Default backup location for a target: `<target>.guardbak`
    pub fn default_backup_path(target: &Path) -> PathBuf {
        let mut name = OsString::from(target.as_os_str());
        name.push(DEFAULT_BACKUP_SUFFIX);
        PathBuf::from(name)
    }
}

/// Why a content divergence was reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Divergence {
    /// The target no longer exists
    Missing,
    /// The target exists but its content digest differs from the backup's
    ContentMismatch {
        /// Digest of the target's current content
        actual: String,
    },
}

/// Result of one detection pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckOutcome {
    /// Cheap identity matches the last known snapshot; no content was read
    Unchanged,
    /// Metadata changed but the content still equals the backup
    MetadataOnly,
    /// Content differs from the backup (or the target is gone)
    Tampered(Divergence),
}

impl CheckOutcome {
    /// Whether this outcome requires a restore
    pub fn is_tampered(&self) -> bool {
        matches!(self, CheckOutcome::Tampered(_))
    }
}

/// What caused a detection pass to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Startup verification before the watch loop
    Startup,
    /// A file system notification in the target's directory
    Event,
    /// A polling tick
    Poll,
    /// A follow-up pass scheduled after a transient failure
    Retry,
}

/// Details about a completed restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    /// The file that was restored
    pub target: PathBuf,
    /// Pass that detected the divergence
    pub trigger: Trigger,
    /// Number of bytes copied from the backup
    pub bytes_written: u64,
    /// Time spent copying and renaming
    pub duration_ms: u64,
    /// When the rename completed
    pub restored_at: DateTime<Utc>,
}

/// Result of one detect-and-restore critical section
#[derive(Debug, Clone)]
pub struct PassReport {
    /// What caused the pass
    pub trigger: Trigger,
    /// What the detector concluded
    pub outcome: CheckOutcome,
    /// Present when the pass restored the target
    pub restore: Option<RestoreReport>,
}

impl PassReport {
    /// Whether this pass wrote the target
    pub fn restored(&self) -> bool {
        self.restore.is_some()
    }
}

/// Why the guard stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The cancellation token fired (signal or caller request)
    Cancelled,
    /// Only-once mode completed its single restore
    OnlyOnce,
}

/// Totals reported when the guard terminates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Detection passes executed, including the startup check
    pub passes: u64,
    /// Restores performed
    pub restores: usize,
    /// Why the run ended
    pub stop_reason: StopReason,
}

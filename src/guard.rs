//! The guard controller
//!
//! [`FileGuard`] owns the lifecycle of one protected file:
//!
//! ```text
//! INIT ──> STARTUP_CHECK ──> WATCHING ──> TERMINATED
//!               │   ▲            │   ▲
//!               ▼   │            ▼   │
//!              RESTORE          RESTORE
//! ```
//!
//! - **INIT** ([`FileGuard::new`]): remove staging leftovers, ensure the
//!   backup exists and record its digest.
//! - **STARTUP_CHECK**: subscribe the chosen [`Watcher`] first, then hash the
//!   target unconditionally and restore it if it differs from the backup.
//! - **WATCHING**: wait on the watcher and run a pass per trigger. A pass
//!   that fails on the target side (unreadable, or the restore could not be
//!   written) is logged and repeated on the next trigger.
//! - **TERMINATED**: the cancellation token fired, or only-once mode
//!   completed its restore. The watcher is shut down before `run` returns.
//!
//! ## Thread Safety
//!
//! Every detect-and-restore pass holds the [`GuardState`] mutex from the
//! first `stat` until the post-restore snapshot is stored, so passes never
//! interleave no matter which task triggers them. Passes run on Tokio's
//! blocking pool since they do synchronous file I/O.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use fileguard::{FileGuardBuilder, WatchMode};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> fileguard::Result<()> {
//! let guard = FileGuardBuilder::new()
//!     .poll_interval(Duration::from_millis(100))
//!     .watch_mode(WatchMode::Auto)
//!     .build("config/app.toml")?;
//!
//! let token = CancellationToken::new();
//! let summary = guard.run(token.clone()).await?;
//! println!("restored {} times", summary.restores);
//! # Ok(())
//! # }
//! ```

use crate::backup::BackupReference;
use crate::detector::ChangeDetector;
use crate::error::{GuardError, Result};
use crate::restore::{self, RestoreEngine};
use crate::snapshot::FileSnapshot;
use crate::types::*;
use crate::utils;
use crate::watcher::{TriggerSource, Watcher};
use chrono::Utc;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Mutable state of a guard, only touched inside the pass critical section
#[derive(Debug, Clone)]
pub struct GuardState {
    /// Last snapshot known to hold the backup's content
    ///
    /// `None` forces the next pass to hash the target.
    pub current: Option<FileSnapshot>,
    /// Trusted reference and its digest
    pub backup: BackupReference,
    /// Passes executed so far
    pub passes: u64,
    /// Restores performed so far
    pub restores: usize,
}

impl GuardState {
    /// Fresh state with no trusted snapshot yet
    pub fn new(backup: BackupReference) -> Self {
        GuardState {
            current: None,
            backup,
            passes: 0,
            restores: 0,
        }
    }

    /// Whether at least one restore happened
    pub fn has_restored_once(&self) -> bool {
        self.restores > 0
    }
}

struct GuardInner {
    config: GuardConfig,
    detector: ChangeDetector,
    restorer: RestoreEngine,
    state: Mutex<GuardState>,
}

/// Protects one file against replacement or corruption
///
/// Cloning is cheap; clones share the same state and critical section.
#[derive(Clone)]
pub struct FileGuard {
    inner: Arc<GuardInner>,
}

impl std::fmt::Debug for FileGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileGuard")
            .field("config", &self.inner.config)
            .field("state", &self.inner.state.try_lock().map(|s| s.clone()))
            .finish()
    }
}

impl FileGuard {
    /// Initialize a guard from a complete configuration
    ///
    /// # Errors
    ///
    /// - [`GuardError::InvalidConfiguration`] for a zero poll interval
    /// - [`GuardError::NoSourceForBackup`] if neither target nor backup exists
    /// - [`GuardError::BackupUnreadable`] if the backup cannot be hashed
    pub fn new(config: GuardConfig) -> Result<Self> {
        if config.poll_interval.is_zero() {
            return Err(GuardError::config("poll interval must be greater than zero"));
        }
        if config.target == config.backup {
            return Err(GuardError::config("backup path must differ from the target path"));
        }

        let restorer = RestoreEngine::new(config.target.clone());
        let orphans = restorer.cleanup_staging()? + restore::cleanup_staging(&config.backup)?;
        if orphans > 0 {
            info!("Removed {} orphaned staging file(s)", orphans);
        }

        let backup = BackupReference::ensure(&config.target, &config.backup)?;

        Ok(FileGuard {
            inner: Arc::new(GuardInner {
                detector: ChangeDetector::new(config.target.clone()),
                restorer,
                state: Mutex::new(GuardState::new(backup)),
                config,
            }),
        })
    }

    /// The configuration this guard runs with
    pub fn config(&self) -> &GuardConfig {
        &self.inner.config
    }

    /// The protected file
    pub fn target(&self) -> &Path {
        &self.inner.config.target
    }

    /// The trusted reference
    pub fn backup(&self) -> BackupReference {
        self.inner.state.lock().backup.clone()
    }

    /// Copy of the current state
    pub fn state(&self) -> GuardState {
        self.inner.state.lock().clone()
    }

    /// Run one detect-and-restore pass
    ///
    /// `Trigger::Startup` hashes the target unconditionally; every other
    /// trigger goes through the cheap filter first. The state lock is held
    /// for the whole pass.
    pub fn check_and_restore(&self, trigger: Trigger) -> Result<PassReport> {
        let mut state = self.inner.state.lock();
        state.passes += 1;

        let outcome = match trigger {
            Trigger::Startup => self.inner.detector.verify(&mut state)?,
            _ => self.inner.detector.check(&mut state)?,
        };

        let restore = match &outcome {
            CheckOutcome::Tampered(divergence) => {
                warn!(?divergence, "File tampering detected, restoring from backup");
                Some(self.restore_locked(&mut state, trigger)?)
            }
            CheckOutcome::MetadataOnly => {
                debug!("Metadata-only change on {}", self.target().display());
                None
            }
            CheckOutcome::Unchanged => None,
        };

        Ok(PassReport {
            trigger,
            outcome,
            restore,
        })
    }

    fn restore_locked(&self, state: &mut GuardState, trigger: Trigger) -> Result<RestoreReport> {
        let stats = match self.inner.restorer.restore(&state.backup) {
            Ok(stats) => stats,
            Err(e) => {
                // Whatever is on disk now is unknown; hash it on the next pass.
                state.current = None;
                if e.is_backup_failure() {
                    error!("Cannot restore {}: {}", self.target().display(), e);
                }
                return Err(e);
            }
        };
        state.restores += 1;

        // Only trust the new snapshot if it still holds the backup's bytes.
        state.current = match FileSnapshot::capture(self.target()).and_then(FileSnapshot::with_digest) {
            Ok(snapshot) if state.backup.matches(snapshot.digest.as_deref()) => Some(snapshot),
            Ok(_) => {
                warn!("Target changed again right after restore");
                None
            }
            Err(e) => {
                warn!("Could not snapshot restored target: {}", e);
                None
            }
        };

        info!(
            "Restore completed ({} in {}ms)",
            utils::format_bytes(stats.bytes_written),
            stats.duration_ms
        );

        Ok(RestoreReport {
            target: self.target().to_path_buf(),
            trigger,
            bytes_written: stats.bytes_written,
            duration_ms: stats.duration_ms,
            restored_at: Utc::now(),
        })
    }

    /// Run a pass on the blocking pool
    async fn pass(&self, trigger: Trigger) -> Result<PassReport> {
        let guard = self.clone();
        tokio::task::spawn_blocking(move || guard.check_and_restore(trigger))
            .await
            .map_err(|e| GuardError::internal(format!("detection pass panicked: {}", e)))?
    }

    /// Verify the target, then watch it until cancelled or until only-once mode is done
    ///
    /// The watcher subscribes before the startup check, so a write landing
    /// right after that check is still queued as a trigger. Cancelling
    /// `token` stops the loop at the next await point; the watcher is always
    /// shut down before this returns.
    ///
    /// # Errors
    ///
    /// Backup failures and watcher setup failures end the run with an
    /// error. Target-side read and write failures are logged and retried.
    #[instrument(skip(self, token), fields(target = %self.target().display()))]
    pub async fn run(&self, token: CancellationToken) -> Result<RunSummary> {
        let mut watcher = Watcher::select(
            self.inner.config.watch_mode,
            self.target(),
            self.inner.config.poll_interval,
        )?;

        let outcome = self.run_with(&mut watcher, &token).await;
        if let Err(e) = watcher.shutdown() {
            warn!("Failed to stop watcher: {}", e);
        }

        let stop_reason = outcome?;
        Ok(self.summary(stop_reason))
    }

    async fn run_with(&self, watcher: &mut Watcher, token: &CancellationToken) -> Result<StopReason> {
        info!("Performing initial check");
        match self.pass(Trigger::Startup).await {
            Ok(report) if report.restored() && self.inner.config.only_once => {
                info!("only-once mode: restored at startup, exiting");
                return Ok(StopReason::OnlyOnce);
            }
            Ok(_) => {}
            Err(e) if e.is_recoverable() => {
                warn!("Initial check failed, will retry: {}", e);
                watcher.schedule_retry();
            }
            Err(e) => return Err(e),
        }

        if token.is_cancelled() {
            return Ok(StopReason::Cancelled);
        }

        info!(
            "Entering watch loop ({}, poll interval {})",
            watcher.kind(),
            humantime::format_duration(self.inner.config.poll_interval)
        );
        self.watch(watcher, token).await
    }

    async fn watch(&self, watcher: &mut Watcher, token: &CancellationToken) -> Result<StopReason> {
        loop {
            let trigger = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Stop requested");
                    return Ok(StopReason::Cancelled);
                }
                trigger = watcher.next_trigger() => trigger?,
            };

            match self.pass(trigger).await {
                Ok(report) if report.restored() && self.inner.config.only_once => {
                    info!("only-once mode: restored once, exiting");
                    return Ok(StopReason::OnlyOnce);
                }
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    warn!("Check failed, will retry: {}", e);
                    watcher.schedule_retry();
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn summary(&self, stop_reason: StopReason) -> RunSummary {
        let state = self.inner.state.lock();
        RunSummary {
            passes: state.passes,
            restores: state.restores,
            stop_reason,
        }
    }
}

/// Builder for configuring a [`FileGuard`]
///
/// # Examples
///
/// ```rust,no_run
/// use fileguard::FileGuardBuilder;
/// use std::time::Duration;
///
/// # fn main() -> fileguard::Result<()> {
/// let guard = FileGuardBuilder::new()
///     .backup_path("/var/lib/pins/app.toml")
///     .poll_interval(Duration::from_millis(500))
///     .only_once(true)
///     .build("/etc/app.toml")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileGuardBuilder {
    backup: Option<PathBuf>,
    poll_interval: Duration,
    only_once: bool,
    watch_mode: WatchMode,
}

impl FileGuardBuilder {
    /// Create a builder with default settings
    ///
    /// Backup `<target>.guardbak`, poll interval 200 ms, keep watching after
    /// restores, automatic watch mode.
    pub fn new() -> Self {
        FileGuardBuilder {
            backup: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            only_once: false,
            watch_mode: WatchMode::Auto,
        }
    }

    /// Use an explicit backup path instead of `<target>.guardbak`
    pub fn backup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup = Some(path.into());
        self
    }

    /// Interval between checks when polling
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Stop after the first restore
    pub fn only_once(mut self, only_once: bool) -> Self {
        self.only_once = only_once;
        self
    }

    /// Trigger strategy for the watch loop
    pub fn watch_mode(mut self, mode: WatchMode) -> Self {
        self.watch_mode = mode;
        self
    }

    /// Resolve paths and produce the configuration without touching any file
    pub fn config(self, target: impl AsRef<Path>) -> Result<GuardConfig> {
        let target = utils::absolutize(target.as_ref())?;
        let backup = match self.backup {
            Some(backup) => utils::absolutize(&backup)?,
            None => GuardConfig::default_backup_path(&target),
        };

        Ok(GuardConfig {
            target,
            backup,
            poll_interval: self.poll_interval,
            only_once: self.only_once,
            watch_mode: self.watch_mode,
        })
    }

    /// Build the guard, creating the backup if needed
    pub fn build(self, target: impl AsRef<Path>) -> Result<FileGuard> {
        FileGuard::new(self.config(target)?)
    }
}

impl Default for FileGuardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

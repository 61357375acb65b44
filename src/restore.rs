//! Atomic restoration of the guarded file
//!
//! Restoring never writes the target in place. The backup is streamed into a
//! temporary file created in the target's own directory (so the final rename
//! stays on one file system), given the backup's permissions and timestamps,
//! flushed to disk, and only then renamed over the target. At every observable
//! instant the target therefore holds either its previous content or the full
//! backup content.
//!
//! The stream is hashed while it is copied. If the backup no longer matches
//! the digest recorded at startup the temporary file is discarded and the
//! target is left alone. Failures on the target side (creating, writing or
//! renaming the staging file) are reported as recoverable
//! [`GuardError::TransientWrite`] so the guard can try again on the next pass.
//!
//! Temporary files carry a deterministic prefix (`.<name>.guard-restore-`) so
//! leftovers from an interrupted run can be found and removed on startup.

use crate::backup::BackupReference;
use crate::error::{GuardError, Result};
use crate::utils::{self, GUARD_READ_CHUNK};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, instrument, trace, warn};

/// Marker embedded in the name of every staging file
pub const STAGING_MARKER: &str = ".guard-restore-";

/// Bytes copied by a staged write and the digest of what was copied
#[derive(Debug, Clone)]
pub(crate) struct StagedCopy {
    pub bytes: u64,
    pub digest: String,
}

/// Name prefix of staging files for `dest`
pub fn staging_prefix(dest: &Path) -> String {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(".{}{}", name, STAGING_MARKER)
}

/// Copy `source` over `dest` through a same-directory temp file and an atomic rename
///
/// `on_source_error` classifies read failures on the source, which mean
/// different things for a backup than for a target. When `expected` is given
/// the copied bytes must hash to it or nothing is renamed.
pub(crate) fn atomic_copy(
    source: &Path,
    dest: &Path,
    expected: Option<&str>,
    on_source_error: impl Fn(io::Error) -> GuardError,
) -> Result<StagedCopy> {
    let mut reader = File::open(source).map_err(&on_source_error)?;
    let metadata = reader.metadata().map_err(&on_source_error)?;

    let on_dest_error = |source: io::Error| GuardError::TransientWrite {
        path: dest.to_path_buf(),
        source,
    };

    let dir = utils::parent_dir(dest);
    let mut staged = tempfile::Builder::new()
        .prefix(&staging_prefix(dest))
        .tempfile_in(&dir)
        .map_err(on_dest_error)?;
    trace!("Staging {:?} at {:?}", source, staged.path());

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; GUARD_READ_CHUNK];
    let mut bytes = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer).map_err(&on_source_error)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        staged.write_all(&buffer[..bytes_read]).map_err(on_dest_error)?;
        bytes += bytes_read as u64;
    }

    let digest = hex::encode(hasher.finalize());
    if let Some(expected) = expected {
        if digest != expected {
            // Dropping `staged` removes the temp file; `dest` was never touched.
            return Err(GuardError::BackupCorrupted {
                path: source.to_path_buf(),
                expected: expected.to_string(),
                actual: digest,
            });
        }
    }

    // Metadata first so the fsync covers it.
    utils::copy_file_times_and_permissions(&metadata, staged.path()).map_err(on_dest_error)?;
    staged.as_file().sync_all().map_err(on_dest_error)?;

    staged.persist(dest).map_err(|e| on_dest_error(e.error))?;
    sync_dir(&dir);

    Ok(StagedCopy { bytes, digest })
}

/// Flush the directory entry of a rename
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!("Could not sync directory {:?}: {}", dir, e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Remove staging files left behind by an interrupted copy onto `dest`
///
/// Returns the number of files removed.
pub fn cleanup_staging(dest: &Path) -> Result<usize> {
    let dir = utils::parent_dir(dest);
    let prefix = staging_prefix(dest);

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            warn!("Removing orphaned staging file: {}", entry.path().display());
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not remove {}: {}", entry.path().display(), e),
            }
        }
    }

    Ok(removed)
}

/// Writes the backup's bytes over the target
#[derive(Debug, Clone)]
pub struct RestoreEngine {
    target: PathBuf,
}

/// Bytes and time spent by one restore
#[derive(Debug, Clone, Copy)]
pub struct RestoreStats {
    /// Bytes copied from the backup
    pub bytes_written: u64,
    /// Wall time of copy plus rename
    pub duration_ms: u64,
}

impl RestoreEngine {
    /// Create an engine for `target`
    pub fn new(target: PathBuf) -> Self {
        RestoreEngine { target }
    }

    /// The file this engine restores
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically replace the target with the backup's content
    ///
    /// # Errors
    ///
    /// - [`GuardError::BackupUnreadable`] if the backup cannot be read
    /// - [`GuardError::BackupCorrupted`] if the backup no longer matches its digest
    /// - [`GuardError::TransientWrite`] if staging or the final rename fails;
    ///   the target keeps its previous content
    #[instrument(skip(self, backup), fields(target = %self.target.display()))]
    pub fn restore(&self, backup: &BackupReference) -> Result<RestoreStats> {
        let start = Instant::now();

        let copy = atomic_copy(backup.path(), &self.target, Some(backup.digest()), |source| {
            GuardError::BackupUnreadable {
                path: backup.path().to_path_buf(),
                source,
            }
        })?;

        Ok(RestoreStats {
            bytes_written: copy.bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Remove staging files left by an interrupted restore
    pub fn cleanup_staging(&self) -> Result<usize> {
        cleanup_staging(&self.target)
    }
}

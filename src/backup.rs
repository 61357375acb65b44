//! The trusted reference copy
//!
//! [`BackupReference::ensure`] makes sure a backup exists (creating it from
//! the target on first run) and records the SHA-256 of its content. That
//! digest is the ground truth for every later comparison: the guard never
//! writes the backup again and never re-reads it except while restoring,
//! where the bytes are checked against the recorded digest.

use crate::error::{GuardError, Result};
use crate::restore;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Backup file plus the digest recorded when the guard started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReference {
    path: PathBuf,
    digest: String,
}

impl BackupReference {
    /// Ensure the backup exists and record its digest
    ///
    /// If `backup` is absent it is created from `target`, preserving the
    /// target's permissions and timestamps. The copy goes through a staging
    /// file, so a crash never leaves a partial backup behind.
    ///
    /// # Errors
    ///
    /// - [`GuardError::NoSourceForBackup`] if neither file exists
    /// - [`GuardError::BackupUnreadable`] if the backup cannot be hashed
    #[instrument]
    pub fn ensure(target: &Path, backup: &Path) -> Result<Self> {
        if !backup_exists(backup)? {
            if !target.exists() {
                return Err(GuardError::NoSourceForBackup {
                    target: target.to_path_buf(),
                    backup: backup.to_path_buf(),
                });
            }

            info!("Creating backup file: {}", backup.display());
            restore::atomic_copy(target, backup, None, |source| GuardError::TransientRead {
                path: target.to_path_buf(),
                source,
            })?;
        }

        let digest = utils::hash_file_content(backup).map_err(|source| {
            GuardError::BackupUnreadable {
                path: backup.to_path_buf(),
                source,
            }
        })?;
        info!("Backup hash: {}", digest);

        Ok(BackupReference {
            path: backup.to_path_buf(),
            digest,
        })
    }

    /// Path of the backup file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SHA-256 of the backup recorded at startup
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Whether `digest` equals the backup's content digest
    pub fn matches(&self, digest: Option<&str>) -> bool {
        digest == Some(self.digest.as_str())
    }
}

fn backup_exists(backup: &Path) -> Result<bool> {
    match fs::symlink_metadata(backup) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(GuardError::BackupUnreadable {
            path: backup.to_path_buf(),
            source,
        }),
    }
}

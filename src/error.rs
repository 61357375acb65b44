//! Error types for fileguard
//!
//! This module defines every error that can surface while guarding a file.
//! The variants are split along the line the guard cares about at runtime:
//! failures that only spoil the current detection pass (retried on the next
//! trigger) versus failures that leave the guard without a trustworthy
//! source of truth (which end the run).

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the fileguard library
pub type Result<T> = std::result::Result<T, GuardError>;

/// Main error type for all guard operations
#[derive(Debug, Error)]
pub enum GuardError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors reported by the file system notification backend
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Neither the target nor the backup exists, so there is nothing to protect
    #[error("No source for backup: target {target:?} does not exist and no backup at {backup:?}")]
    NoSourceForBackup {
        /// Path of the protected file
        target: PathBuf,
        /// Path where the backup was expected
        backup: PathBuf,
    },

    /// The target could not be read between the cheap check and the digest
    #[error("Transient read failure on {path:?}: {source}")]
    TransientRead {
        /// Path that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The backup itself could not be read
    #[error("Backup unreadable at {path:?}: {source}")]
    BackupUnreadable {
        /// Path of the backup file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The backup no longer hashes to the digest recorded at startup
    #[error("Backup corrupted at {path:?} - expected: {expected}, actual: {actual}")]
    BackupCorrupted {
        /// Path of the backup file
        path: PathBuf,
        /// Digest recorded when the guard started
        expected: String,
        /// Digest of the bytes just read
        actual: String,
    },

    /// Writing the restored content next to the target, or renaming it into place, failed
    #[error("Restore write failed on {path:?}: {source}")]
    TransientWrite {
        /// Destination that could not be written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardError {
    /// Create a configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        GuardError::InvalidConfiguration(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        GuardError::Internal(msg.into())
    }

    /// Check if this error only affects the current pass
    ///
    /// Target-side read and write failures are logged and the check is
    /// repeated on the next trigger. Everything else terminates the watch loop.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GuardError::TransientRead { .. } | GuardError::TransientWrite { .. }
        )
    }

    /// Check if this error means the backup can no longer be trusted
    pub fn is_backup_failure(&self) -> bool {
        matches!(
            self,
            GuardError::BackupUnreadable { .. } | GuardError::BackupCorrupted { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            GuardError::NoSourceForBackup { target, backup } => {
                format!(
                    "Nothing to protect: {:?} does not exist and there is no backup at {:?}. \
                     Create the target first or pass an existing backup with --backup.",
                    target, backup
                )
            }
            GuardError::BackupUnreadable { path, source } => {
                format!(
                    "Backup {:?} cannot be read ({}). The guard cannot know which content to restore.",
                    path, source
                )
            }
            GuardError::BackupCorrupted { path, .. } => {
                format!(
                    "Backup {:?} changed since the guard started. Refusing to restore from it; \
                     verify the backup and restart the guard.",
                    path
                )
            }
            GuardError::InvalidConfiguration(msg) => {
                format!("{}. Run with --help to see accepted values.", msg)
            }
            _ => self.to_string(),
        }
    }
}

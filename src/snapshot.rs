//! Cheap file identity snapshots
//!
//! A [`FileSnapshot`] records what `stat` says about a path: whether it
//! exists, its device and inode, its modification time and its size. None
//! of that requires reading the file. The content digest is only filled in
//! on request through [`FileSnapshot::with_digest`].
//!
//! Cheap equality is a fast negative filter. Two snapshots that compare
//! cheap-equal are assumed to hold the same content; two that differ may
//! still hold identical bytes (a `touch`, or a re-save of the same data).

use crate::error::{GuardError, Result};
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::trace;

/// Device and inode pair identifying a file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    /// Device the file lives on
    pub device: u64,
    /// Inode number on that device
    pub inode: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn from_metadata(metadata: &fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(FileIdentity {
            device: metadata.dev(),
            inode: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn from_metadata(_metadata: &fs::Metadata) -> Option<Self> {
        None
    }
}

/// Point-in-time view of a path's cheap identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// Path the snapshot was taken of
    pub path: PathBuf,
    /// Whether the path existed when captured
    pub exists: bool,
    /// Device and inode (absent when missing, or on platforms without inodes)
    pub identity: Option<FileIdentity>,
    /// Last modification time
    pub modified: Option<SystemTime>,
    /// Size in bytes
    pub size: Option<u64>,
    /// SHA-256 of the content, filled in lazily
    pub digest: Option<String>,
}

impl FileSnapshot {
    /// Stat `path` without reading its content
    ///
    /// A missing file is a valid state and yields `exists == false`. Any
    /// other stat failure is reported as a transient read error.
    pub fn capture(path: &Path) -> Result<Self> {
        match fs::metadata(path) {
            Ok(metadata) => {
                let snapshot = FileSnapshot {
                    path: path.to_path_buf(),
                    exists: true,
                    identity: FileIdentity::from_metadata(&metadata),
                    modified: metadata.modified().ok(),
                    size: Some(metadata.len()),
                    digest: None,
                };
                trace!("Captured snapshot: {:?}", snapshot);
                Ok(snapshot)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::missing(path)),
            Err(source) => Err(GuardError::TransientRead {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Snapshot of a path that does not exist
    pub fn missing(path: &Path) -> Self {
        FileSnapshot {
            path: path.to_path_buf(),
            exists: false,
            identity: None,
            modified: None,
            size: None,
            digest: None,
        }
    }

    /// Compute and attach the content digest
    ///
    /// Missing files keep `digest == None`. A read failure is transient:
    /// the file may have vanished or been locked since it was stat'ed.
    pub fn with_digest(mut self) -> Result<Self> {
        if self.exists {
            let digest = utils::hash_file_content(&self.path).map_err(|source| {
                GuardError::TransientRead {
                    path: self.path.clone(),
                    source,
                }
            })?;
            self.digest = Some(digest);
        }
        Ok(self)
    }

    /// Compare existence, identity, modification time and size
    ///
    /// The digest is never consulted.
    pub fn cheap_eq(&self, other: &FileSnapshot) -> bool {
        if self.exists != other.exists {
            return false;
        }
        if !self.exists {
            return true;
        }
        self.identity == other.identity && self.modified == other.modified && self.size == other.size
    }
}

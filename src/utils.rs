//! Utility functions for fileguard
//!
//! This module provides the low-level helpers used by the snapshot, backup,
//! restore and manifest modules.
//!
//! ## Categories of Utilities
//!
//! ### Content Digests
//! - Streaming SHA-256 of a file (the guard's ground truth for equality)
//! - Streaming MD5 of a file (manifest records only)
//!
//! ### Metadata Preservation
//! - Copying permission bits and access/modification times between files
//!
//! ### Path Manipulation
//! - Absolute path resolution without requiring the path to exist
//! - Containing directory of a file
//!
//! ## Error Handling
//!
//! Digest helpers return plain [`std::io::Result`] so callers can decide
//! whether a read failure is transient (target side) or fatal (backup side).

use crate::error::Result;
use filetime::FileTime;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Read size used when hashing guarded files
pub const GUARD_READ_CHUNK: usize = 4 * 1024 * 1024;

/// Read size used when hashing manifest inputs
pub const MANIFEST_READ_CHUNK: usize = 1024 * 1024;

/// Stream a file through any RustCrypto digest in fixed-size chunks
///
/// Returns the lowercase hexadecimal digest. The file is never loaded
/// into memory in full.
pub fn digest_file<D: Digest>(path: &Path, chunk_size: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; chunk_size];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash a file's content using SHA-256
///
/// # Example
///
/// ```rust,ignore
/// use crate::utils::hash_file_content;
/// use std::path::Path;
///
/// let hash = hash_file_content(Path::new("app.conf"))?;
/// assert_eq!(hash.len(), 64);
/// ```
pub fn hash_file_content(path: &Path) -> io::Result<String> {
    digest_file::<Sha256>(path, GUARD_READ_CHUNK)
}

/// Hash a file's content using MD5
pub fn md5_file_content(path: &Path) -> io::Result<String> {
    digest_file::<Md5>(path, MANIFEST_READ_CHUNK)
}

/// Hash arbitrary data using SHA-256
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Copy permission bits and access/modification times from `source` to `dest`
///
/// Mirrors a metadata-preserving copy. Ownership is not transferred.
pub fn copy_file_times_and_permissions(source: &fs::Metadata, dest: &Path) -> io::Result<()> {
    fs::set_permissions(dest, source.permissions())?;

    let atime = FileTime::from_last_access_time(source);
    let mtime = FileTime::from_last_modification_time(source);
    filetime::set_file_times(dest, atime, mtime)?;

    Ok(())
}

/// Resolve a path against the current directory without touching the file system
///
/// Unlike [`Path::canonicalize`] the path does not need to exist, which
/// matters for a target that has already been deleted.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// Directory containing `path`, or `.` for a bare file name
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Format bytes in human-readable form
///
/// Values below 1024 are shown as whole bytes, larger values with two
/// decimals in binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

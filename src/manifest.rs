//! File manifests
//!
//! Describes a list of files as JSON records carrying an MD5 content hash
//! and the byte size of each file. This is independent of the guard itself;
//! it is the companion tool used to publish metadata about the files a
//! guard pins.
//!
//! ```rust,no_run
//! use fileguard::manifest::{build_manifest, render_manifest};
//! use std::path::PathBuf;
//!
//! # fn main() -> fileguard::Result<()> {
//! let entries = build_manifest(&[PathBuf::from("pakchunk0.pak")])?;
//! println!("{}", render_manifest(&entries)?);
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One manifest record
///
/// Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// File name without directories
    pub name: String,
    /// Lowercase hex MD5 of the content
    pub hash: String,
    /// Base reference, always empty
    pub base: String,
    /// Diff reference, always empty
    pub diff: String,
    /// Size in bytes
    #[serde(rename = "sizeInBytes")]
    pub size_in_bytes: u64,
    /// Primary flag, always 0
    #[serde(rename = "bPrimary")]
    pub b_primary: u8,
}

impl ManifestEntry {
    /// Describe a single regular file
    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size_in_bytes = fs::metadata(path)?.len();
        let hash = utils::md5_file_content(path)?;

        Ok(ManifestEntry {
            name,
            hash,
            base: String::new(),
            diff: String::new(),
            size_in_bytes,
            b_primary: 0,
        })
    }
}

/// Describe every regular file in `paths`, in input order
///
/// Paths that do not exist or are not regular files are skipped.
pub fn build_manifest(paths: &[PathBuf]) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.is_file() {
            debug!("Skipping non-file input: {}", path.display());
            continue;
        }
        entries.push(ManifestEntry::from_file(path)?);
    }
    Ok(entries)
}

/// Pretty-print entries as a JSON array with two-space indentation
///
/// Non-ASCII names are emitted verbatim as UTF-8.
pub fn render_manifest(entries: &[ManifestEntry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}

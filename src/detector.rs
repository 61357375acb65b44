//! Two-tier change detection
//!
//! Every pass starts with a fresh [`FileSnapshot`]. If it is cheap-equal to
//! the last accepted snapshot the pass ends there without reading a byte of
//! content, which is what keeps polling and event storms inexpensive. Only
//! when the identity really moved is the content hashed and compared with
//! the backup digest:
//!
//! | fresh snapshot            | digest vs backup | outcome          |
//! |---------------------------|------------------|------------------|
//! | cheap-equal to last       | not computed     | `Unchanged`      |
//! | missing                   | not computed     | `Tampered`       |
//! | changed identity/metadata | equal            | `MetadataOnly`   |
//! | changed identity/metadata | different        | `Tampered`       |
//!
//! A `MetadataOnly` result replaces the stored snapshot so the next pass is
//! cheap again. A `Tampered` result leaves the stored snapshot alone; the
//! controller replaces it after restoring.

use crate::error::Result;
use crate::guard::GuardState;
use crate::snapshot::FileSnapshot;
use crate::types::{CheckOutcome, Divergence};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Decides whether the target still matches the backup
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    target: PathBuf,
}

impl ChangeDetector {
    /// Create a detector for `target`
    pub fn new(target: PathBuf) -> Self {
        ChangeDetector { target }
    }

    /// The file being checked
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Run the two-tier check against the stored snapshot
    ///
    /// # Errors
    ///
    /// Returns a recoverable [`GuardError::TransientRead`](crate::GuardError::TransientRead)
    /// if the target cannot be stat'ed or read mid-pass. The stored snapshot
    /// is left untouched so the next trigger repeats the full check.
    pub fn check(&self, state: &mut GuardState) -> Result<CheckOutcome> {
        let fresh = FileSnapshot::capture(&self.target)?;

        if let Some(current) = &state.current {
            if fresh.cheap_eq(current) {
                trace!("Target unchanged: {}", self.target.display());
                return Ok(CheckOutcome::Unchanged);
            }
        }

        self.compare_content(fresh, state)
    }

    /// Check content unconditionally, skipping the cheap filter
    ///
    /// Used for the startup pass, where no trusted snapshot exists yet. A
    /// target whose content equals the backup is reported as `Unchanged`.
    pub fn verify(&self, state: &mut GuardState) -> Result<CheckOutcome> {
        let fresh = FileSnapshot::capture(&self.target)?;

        match self.compare_content(fresh, state)? {
            CheckOutcome::MetadataOnly => Ok(CheckOutcome::Unchanged),
            outcome => Ok(outcome),
        }
    }

    fn compare_content(&self, fresh: FileSnapshot, state: &mut GuardState) -> Result<CheckOutcome> {
        if !fresh.exists {
            debug!("Target missing: {}", self.target.display());
            return Ok(CheckOutcome::Tampered(Divergence::Missing));
        }

        let fresh = fresh.with_digest()?;
        if state.backup.matches(fresh.digest.as_deref()) {
            debug!("Metadata changed, content identical: {}", self.target.display());
            state.current = Some(fresh);
            return Ok(CheckOutcome::MetadataOnly);
        }

        Ok(CheckOutcome::Tampered(Divergence::ContentMismatch {
            actual: fresh.digest.unwrap_or_default(),
        }))
    }
}

//! Source to target file synchronization.
//!
//! Targets are compared with their sources byte for byte on every tick, since
//! they can drift independently of the manifest. Only differing targets are
//! rewritten.

use crate::config::FilePair;
use crate::error::ControllerError;
use scheduler_manifest::atomic::copy_atomic;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

/// Result of synchronizing one pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Target was missing or different and has been rewritten
    Changed,
    /// Target already matched the source
    Unchanged,
}

/// Keeps every declared target identical to its source.
#[derive(Debug, Clone)]
pub struct FileSynchronizer {
    pairs: Vec<FilePair>,
}

impl FileSynchronizer {
    /// Creates a synchronizer over `pairs`.
    #[must_use]
    pub fn new(pairs: Vec<FilePair>) -> Self {
        Self { pairs }
    }

    /// Checks that every declared source exists.
    ///
    /// # Errors
    ///
    /// [`ControllerError::MissingSourceFile`] for the first missing source.
    pub fn verify_sources(&self) -> Result<(), ControllerError> {
        for pair in &self.pairs {
            if !pair.source.is_file() {
                return Err(ControllerError::MissingSourceFile(pair.source.clone()));
            }
        }
        Ok(())
    }

    /// Synchronizes every pair, returning how many targets were rewritten.
    ///
    /// # Errors
    ///
    /// The first error from [`sync_if_different`].
    pub fn sync_all(&self) -> Result<usize, ControllerError> {
        let mut changed = 0;
        for pair in &self.pairs {
            if sync_if_different(&pair.source, &pair.target)? == SyncOutcome::Changed {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// Copies `source` over `target` unless both already hold the same bytes.
///
/// A missing target counts as different. Parent directories of `target` are
/// created as needed.
///
/// # Errors
///
/// [`ControllerError::MissingSourceFile`] if `source` does not exist,
/// [`ControllerError::Io`] for any other read or copy failure.
pub fn sync_if_different(source: &Path, target: &Path) -> Result<SyncOutcome, ControllerError> {
    let wanted = fs::read(source).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            ControllerError::MissingSourceFile(source.to_path_buf())
        } else {
            ControllerError::io(format!("failed to read {}", source.display()), e)
        }
    })?;

    match fs::read(target) {
        Ok(current) if current == wanted => {
            debug!("{} is up to date", target.display());
            return Ok(SyncOutcome::Unchanged);
        }
        Ok(_) => info!("{} differs from {}, updating", target.display(), source.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("{} is missing, copying from {}", target.display(), source.display());
        }
        Err(e) => {
            return Err(ControllerError::io(
                format!("failed to read {}", target.display()),
                e,
            ));
        }
    }

    copy_atomic(source, target).map_err(|e| {
        ControllerError::io(
            format!("failed to copy {} to {}", source.display(), target.display()),
            e,
        )
    })?;
    Ok(SyncOutcome::Changed)
}

//! Manifest backup and restore.
//!
//! The backup holds the last successfully applied manifest, stored as
//! `<backup-dir>/<manifest file name>`. Each save overwrites it; restore
//! reads it and never deletes it.

use crate::error::ControllerError;
use scheduler_manifest::atomic::{write_atomic, MANIFEST_MODE};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// A saved manifest copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Where the copy was written
    pub path: PathBuf,
    /// Size of the copy in bytes
    pub size: usize,
}

/// Result of a restore attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The live manifest was overwritten from the backup
    Restored(PathBuf),
    /// No backup exists yet
    NoBackup,
}

/// Stores manifest backups in a single directory.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Creates a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Backup location for `manifest`.
    ///
    /// # Errors
    ///
    /// [`ControllerError::InvalidConfig`] if `manifest` has no file name.
    pub fn backup_path(&self, manifest: &Path) -> Result<PathBuf, ControllerError> {
        let name = manifest.file_name().ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "manifest path {} has no file name",
                manifest.display()
            ))
        })?;
        Ok(self.dir.join(name))
    }

    /// Copies the current on-disk manifest into the store.
    ///
    /// # Errors
    ///
    /// [`ControllerError::Backup`] if the manifest cannot be read or the copy
    /// cannot be written.
    pub fn save(&self, manifest: &Path) -> Result<BackupRecord, ControllerError> {
        let path = self.backup_path(manifest)?;
        let backup_error = |source| ControllerError::Backup {
            path: path.clone(),
            source,
        };
        let content = fs::read(manifest).map_err(backup_error)?;
        write_atomic(&path, &content, Some(MANIFEST_MODE)).map_err(backup_error)?;
        info!("Backed up {} to {}", manifest.display(), path.display());
        Ok(BackupRecord {
            size: content.len(),
            path,
        })
    }

    /// Overwrites `manifest` with its backup.
    ///
    /// A missing backup is not an error; there is simply nothing to restore.
    ///
    /// # Errors
    ///
    /// [`ControllerError::Restore`] if the backup cannot be read or the
    /// manifest cannot be written.
    pub fn restore(&self, manifest: &Path) -> Result<RestoreOutcome, ControllerError> {
        let path = self.backup_path(manifest)?;
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Backup {} not found, skipping restore", path.display());
                return Ok(RestoreOutcome::NoBackup);
            }
            Err(source) => return Err(ControllerError::Restore { path, source }),
        };
        write_atomic(manifest, &content, Some(MANIFEST_MODE)).map_err(|source| {
            ControllerError::Restore {
                path: path.clone(),
                source,
            }
        })?;
        Ok(RestoreOutcome::Restored(path))
    }
}

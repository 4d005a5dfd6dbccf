//! Controller-specific error types.
//!
//! This module defines error types specific to the Scheduler Patcher
//! that are not covered by upstream library errors.

use scheduler_manifest::ManifestError;
use std::path::PathBuf;
use thiserror::Error;

/// How an error affects the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Ends the process; the orchestrator restarts it
    Fatal,
    /// Logged; the surrounding operation continues
    Recoverable,
}

/// Errors that can occur in the Scheduler Patcher.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A declared source file is missing at tick start
    #[error("Source file not found: {}", .0.display())]
    MissingSourceFile(PathBuf),

    /// Cluster version could not be determined
    #[error("Version probe failed: {0}")]
    VersionProbe(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Manifest load, parse or write error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// File synchronization I/O error
    #[error("{context}: {source}")]
    Io {
        /// What was being done
        context: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Backup could not be written
    #[error("Failed to back up manifest to {}: {source}", path.display())]
    Backup {
        /// Backup file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Manifest could not be restored from backup
    #[error("Failed to restore manifest from {}: {source}", path.display())]
    Restore {
        /// Backup file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signal handling could not be set up
    #[error("Shutdown handling failed: {0}")]
    Shutdown(String),

    /// Reconciliation task failed to complete
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),
}

impl ControllerError {
    /// Wraps an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ControllerError::Io {
            context: context.into(),
            source,
        }
    }

    /// Backup and restore failures never undo a successful patch or block
    /// shutdown; everything else ends the process.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            ControllerError::Backup { .. } | ControllerError::Restore { .. } => {
                Severity::Recoverable
            }
            _ => Severity::Fatal,
        }
    }
}

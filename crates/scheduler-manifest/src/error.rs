//! Scheduler manifest errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, validating or persisting a manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file could not be read
    #[error("failed to read manifest {path}: {source}")]
    Read {
        /// Manifest path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Manifest file could not be written
    #[error("failed to write manifest {path}: {source}")]
    Write {
        /// Manifest path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Manifest is not well-formed YAML or not a Pod
    #[error("failed to parse manifest: {0}")]
    Parse(#[source] serde_yaml::Error),

    /// Manifest could not be serialized back to YAML
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[source] serde_yaml::Error),

    /// Manifest parsed but lacks the expected Pod shape
    #[error("invalid manifest shape: {0}")]
    InvalidShape(String),

    /// Reported server version is not numeric
    #[error("invalid Kubernetes version: major={major:?} minor={minor:?}")]
    InvalidVersion {
        /// Major version as reported by the API server
        major: String,
        /// Minor version as reported by the API server
        minor: String,
    },
}

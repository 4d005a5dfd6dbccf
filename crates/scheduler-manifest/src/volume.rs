//! Host file volumes for the scheduler container.

use k8s_openapi::api::core::v1::{HostPathVolumeSource, Volume, VolumeMount};
use std::path::{Path, PathBuf};

/// `hostPath` type for single files
const HOST_PATH_FILE: &str = "File";

/// A host file exposed read-only inside the scheduler container at the same path.
///
/// `name` identifies both the volume and its mount and must be unique within
/// a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    name: String,
    host_path: PathBuf,
}

impl VolumeSpec {
    /// Creates a spec for `host_path`, mounted under the same path.
    pub fn new(name: impl Into<String>, host_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            host_path: host_path.into(),
        }
    }

    /// Volume and mount name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host file path, also used as the mount path
    #[must_use]
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// `spec.volumes` entry
    #[must_use]
    pub fn volume(&self) -> Volume {
        Volume {
            name: self.name.clone(),
            host_path: Some(HostPathVolumeSource {
                path: self.host_path.to_string_lossy().into_owned(),
                type_: Some(HOST_PATH_FILE.to_string()),
            }),
            ..Default::default()
        }
    }

    /// `spec.containers[0].volumeMounts` entry
    #[must_use]
    pub fn volume_mount(&self) -> VolumeMount {
        VolumeMount {
            name: self.name.clone(),
            mount_path: self.host_path.to_string_lossy().into_owned(),
            read_only: Some(true),
            ..Default::default()
        }
    }
}

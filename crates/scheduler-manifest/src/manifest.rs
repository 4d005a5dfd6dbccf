//! kube-scheduler static pod manifest.
//!
//! The manifest is validated against the core/v1 `Pod` schema on load, so a
//! malformed file fails here instead of part-way through patching. Writes go
//! through the parsed YAML tree, never the typed model, so fields the
//! compiled-in schema does not know survive a patch. The scheduler container
//! is always `spec.containers[0]`.

use crate::atomic::{self, MANIFEST_MODE};
use crate::error::ManifestError;
use crate::patcher::Change;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, Volume, VolumeMount};
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::{debug, info, warn};

/// In-memory static pod manifest, loaded fresh for every reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    /// Typed pod spec without the scheduler container
    spec: PodSpec,
    /// Typed `spec.containers[0]`
    container: Container,
    /// Document as written on disk
    tree: Tree,
}

/// Parsed YAML split the same way as the typed view. Taken-out values leave
/// a null in place so keys keep their position on reassembly.
#[derive(Debug, Clone, PartialEq)]
struct Tree {
    pod: Mapping,
    spec: Mapping,
    containers: Vec<Value>,
    container: Mapping,
}

impl Tree {
    fn split(value: Value) -> Result<Self, ManifestError> {
        let Value::Mapping(mut pod) = value else {
            return Err(ManifestError::InvalidShape("document is not a mapping".to_string()));
        };
        let Some(Value::Mapping(mut spec)) = pod.get_mut("spec").map(std::mem::take) else {
            return Err(ManifestError::InvalidShape("spec is not a mapping".to_string()));
        };
        let Some(Value::Sequence(mut containers)) = spec.get_mut("containers").map(std::mem::take)
        else {
            return Err(ManifestError::InvalidShape(
                "spec.containers is not a list".to_string(),
            ));
        };
        let Some(Value::Mapping(container)) = containers.first_mut().map(std::mem::take) else {
            return Err(ManifestError::InvalidShape(
                "spec.containers[0] is not a mapping".to_string(),
            ));
        };
        Ok(Self {
            pod,
            spec,
            containers,
            container,
        })
    }

    fn join(&self) -> Value {
        let mut containers = self.containers.clone();
        if let Some(first) = containers.first_mut() {
            *first = Value::Mapping(self.container.clone());
        }
        let mut spec = self.spec.clone();
        spec.insert("containers".into(), Value::Sequence(containers));
        let mut pod = self.pod.clone();
        pod.insert("spec".into(), Value::Mapping(spec));
        Value::Mapping(pod)
    }
}

/// Appends `item` to the list under `key`, creating the list if absent.
fn append(mapping: &mut Mapping, key: &str, item: Value) {
    if let Some(Value::Sequence(items)) = mapping.get_mut(key) {
        items.push(item);
        return;
    }
    mapping.insert(key.into(), Value::Sequence(vec![item]));
}

impl ManifestDocument {
    /// Reads and validates the manifest at `path`.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Read`] if the file cannot be read, otherwise any
    /// error from [`ManifestDocument::from_yaml`].
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded manifest {} ({} bytes)", path.display(), content.len());
        Self::from_yaml(&content)
    }

    /// Parses and validates a manifest document.
    ///
    /// Absent `volumes`, `command` and `volumeMounts` lists are treated as
    /// empty. A missing `spec` or an empty container list is rejected.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Parse`] if `content` is not a Pod document,
    /// [`ManifestError::InvalidShape`] if it has no scheduler container.
    pub fn from_yaml(content: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_yaml::from_str(content).map_err(ManifestError::Parse)?;
        let mut pod: Pod = serde_yaml::from_value(value.clone()).map_err(ManifestError::Parse)?;
        let mut spec = pod
            .spec
            .take()
            .ok_or_else(|| ManifestError::InvalidShape("missing spec".to_string()))?;
        if spec.containers.is_empty() {
            return Err(ManifestError::InvalidShape(
                "spec.containers is empty".to_string(),
            ));
        }
        let container = spec.containers.remove(0);
        Ok(Self {
            spec,
            container,
            tree: Tree::split(value)?,
        })
    }

    /// Serializes the manifest to YAML.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Serialize`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        serde_yaml::to_string(&self.tree.join()).map_err(ManifestError::Serialize)
    }

    /// Writes the manifest to `path` when `change` says it was modified.
    ///
    /// Returns whether a write happened. Skipping unchanged documents keeps
    /// the kubelet from restarting the scheduler for nothing.
    ///
    /// # Errors
    ///
    /// Any error from [`ManifestDocument::write_to`].
    pub fn flush(&self, path: &Path, change: Change) -> Result<bool, ManifestError> {
        if !change.is_changed() {
            debug!("Manifest {} unchanged, skipping write", path.display());
            return Ok(false);
        }
        self.write_to(path)?;
        Ok(true)
    }

    /// Unconditionally writes the manifest to `path` (mode 0600).
    ///
    /// # Errors
    ///
    /// [`ManifestError::Serialize`] or [`ManifestError::Write`].
    pub fn write_to(&self, path: &Path) -> Result<(), ManifestError> {
        self.stage(path)?
            .commit()
            .map_err(|source| write_error(path, source))
    }

    /// Deletes and recreates the manifest at `path`, forcing the kubelet to
    /// restart the static pod even when the content is unchanged.
    ///
    /// The new content is staged before anything is deleted, so a failed
    /// write leaves the live manifest in place. A failed delete is logged and
    /// the write proceeds.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Serialize`] or [`ManifestError::Write`].
    pub fn recreate(&self, path: &Path) -> Result<(), ManifestError> {
        let staged = self.stage(path)?;
        info!("Recreating {}", path.display());
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
        staged.commit().map_err(|source| write_error(path, source))
    }

    fn stage(&self, path: &Path) -> Result<atomic::StagedFile, ManifestError> {
        let content = self.to_yaml()?;
        atomic::stage(path, content.as_bytes(), Some(MANIFEST_MODE))
            .map_err(|source| write_error(path, source))
    }

    /// Scheduler container name
    #[must_use]
    pub fn container_name(&self) -> &str {
        &self.container.name
    }

    /// `spec.containers[0].command`
    #[must_use]
    pub fn command(&self) -> &[String] {
        self.container.command.as_deref().unwrap_or_default()
    }

    /// `spec.volumes`
    #[must_use]
    pub fn volumes(&self) -> &[Volume] {
        self.spec.volumes.as_deref().unwrap_or_default()
    }

    /// `spec.containers[0].volumeMounts`
    #[must_use]
    pub fn volume_mounts(&self) -> &[VolumeMount] {
        self.container.volume_mounts.as_deref().unwrap_or_default()
    }

    /// Whether the command list contains exactly `arg`.
    #[must_use]
    pub fn has_command_arg(&self, arg: &str) -> bool {
        self.command().iter().any(|existing| existing == arg)
    }

    /// Whether a volume named `name` exists.
    #[must_use]
    pub fn has_volume(&self, name: &str) -> bool {
        self.volumes().iter().any(|volume| volume.name == name)
    }

    /// Whether a volume mount named `name` exists.
    #[must_use]
    pub fn has_volume_mount(&self, name: &str) -> bool {
        self.volume_mounts().iter().any(|mount| mount.name == name)
    }

    pub(crate) fn push_command_arg(&mut self, arg: String) {
        append(&mut self.tree.container, "command", Value::String(arg.clone()));
        self.container.command.get_or_insert_with(Vec::new).push(arg);
    }

    pub(crate) fn push_volume(&mut self, volume: Volume) -> Result<(), ManifestError> {
        let value = serde_yaml::to_value(&volume).map_err(ManifestError::Serialize)?;
        append(&mut self.tree.spec, "volumes", value);
        self.spec.volumes.get_or_insert_with(Vec::new).push(volume);
        Ok(())
    }

    pub(crate) fn push_volume_mount(&mut self, mount: VolumeMount) -> Result<(), ManifestError> {
        let value = serde_yaml::to_value(&mount).map_err(ManifestError::Serialize)?;
        append(&mut self.tree.container, "volumeMounts", value);
        self.container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .push(mount);
        Ok(())
    }
}

fn write_error(path: &Path, source: std::io::Error) -> ManifestError {
    ManifestError::Write {
        path: path.to_path_buf(),
        source,
    }
}

//! Idempotent kube-scheduler manifest patching.
//!
//! Every step checks membership (exact command argument, volume name, mount
//! name) before appending, so patching an already patched document reports
//! [`Change::Unchanged`] and leaves it untouched.

use crate::error::ManifestError;
use crate::manifest::ManifestDocument;
use crate::volume::VolumeSpec;
use std::ops::BitOrAssign;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Whether a patch step modified the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Change {
    /// Nothing was modified
    #[default]
    Unchanged,
    /// At least one step appended something
    Changed,
}

impl Change {
    /// Returns `true` for [`Change::Changed`].
    #[must_use]
    pub fn is_changed(self) -> bool {
        self == Change::Changed
    }
}

impl From<bool> for Change {
    fn from(changed: bool) -> Self {
        if changed {
            Change::Changed
        } else {
            Change::Unchanged
        }
    }
}

impl BitOrAssign for Change {
    fn bitor_assign(&mut self, rhs: Self) {
        if rhs.is_changed() {
            *self = Change::Changed;
        }
    }
}

/// Everything the scheduler manifest must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSet {
    config_path: PathBuf,
    extra_flags: Vec<String>,
    volumes: Vec<VolumeSpec>,
}

impl PatchSet {
    /// Patch set pointing `--config` at `config_path`.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            extra_flags: Vec::new(),
            volumes: Vec::new(),
        }
    }

    /// Adds a literal command-line flag.
    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.extra_flags.push(flag.into());
        self
    }

    /// Adds a required volume/mount pair.
    #[must_use]
    pub fn with_volume(mut self, volume: VolumeSpec) -> Self {
        self.volumes.push(volume);
        self
    }

    /// The `--config=<path>` argument
    #[must_use]
    pub fn config_flag(&self) -> String {
        format!("--config={}", self.config_path.display())
    }

    /// Scheduler config path inside the container
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Extra flags, in injection order
    #[must_use]
    pub fn extra_flags(&self) -> &[String] {
        &self.extra_flags
    }

    /// Required volumes, in injection order
    #[must_use]
    pub fn volumes(&self) -> &[VolumeSpec] {
        &self.volumes
    }
}

/// Loads, patches and persists the scheduler static pod manifest.
#[derive(Debug, Clone)]
pub struct ManifestPatcher {
    manifest_path: PathBuf,
}

impl ManifestPatcher {
    /// Creates a patcher for the manifest at `manifest_path`.
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    /// Path of the managed manifest
    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Loads the manifest from disk.
    ///
    /// # Errors
    ///
    /// See [`ManifestDocument::load`].
    pub fn load(&self) -> Result<ManifestDocument, ManifestError> {
        ManifestDocument::load(&self.manifest_path)
    }

    /// Applies `patches` to `doc`.
    ///
    /// Steps run in a fixed order: `--config` flag, extra flags, volumes,
    /// volume mounts. Each one is independently idempotent.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Serialize`] if a volume or mount cannot be converted
    /// to YAML.
    pub fn patch(
        &self,
        doc: &mut ManifestDocument,
        patches: &PatchSet,
    ) -> Result<Change, ManifestError> {
        let mut change = Change::Unchanged;

        change |= ensure_command_arg(doc, patches.config_flag());
        for flag in patches.extra_flags() {
            change |= ensure_command_arg(doc, flag.clone());
        }

        for spec in patches.volumes() {
            if doc.has_volume(spec.name()) {
                debug!("Volume {} already present", spec.name());
            } else {
                info!(
                    "Adding volume {} ({}) to {}",
                    spec.name(),
                    spec.host_path().display(),
                    self.manifest_path.display()
                );
                doc.push_volume(spec.volume())?;
                change = Change::Changed;
            }
        }

        for spec in patches.volumes() {
            if doc.has_volume_mount(spec.name()) {
                debug!("Volume mount {} already present", spec.name());
            } else {
                info!(
                    "Adding volume mount {} to {}",
                    spec.name(),
                    self.manifest_path.display()
                );
                doc.push_volume_mount(spec.volume_mount())?;
                change = Change::Changed;
            }
        }

        Ok(change)
    }

    /// Writes `doc` back to the manifest path if `change` is set.
    ///
    /// Returns whether a write happened.
    ///
    /// # Errors
    ///
    /// See [`ManifestDocument::flush`].
    pub fn flush(&self, doc: &ManifestDocument, change: Change) -> Result<bool, ManifestError> {
        let written = doc.flush(&self.manifest_path, change)?;
        if written {
            info!("Scheduler manifest {} patched", self.manifest_path.display());
        }
        Ok(written)
    }
}

fn ensure_command_arg(doc: &mut ManifestDocument, arg: String) -> Change {
    if doc.has_command_arg(&arg) {
        debug!("Command argument {} already present", arg);
        return Change::Unchanged;
    }
    info!("Adding command argument {}", arg);
    doc.push_command_arg(arg);
    Change::Changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::UNSCHEDULABLE_PODS_DURATION_FLAG;
    use crate::manifest::tests::{KUBEADM_SCHEDULER, NEWER_SCHEMA};

    fn scheduler_patches() -> PatchSet {
        PatchSet::new("/etc/kubernetes/scheduler/config-23.yaml")
            .with_flag(UNSCHEDULABLE_PODS_DURATION_FLAG)
            .with_volume(VolumeSpec::new(
                "scheduler-config",
                "/etc/kubernetes/scheduler/config.yaml",
            ))
            .with_volume(VolumeSpec::new(
                "scheduler-policy",
                "/etc/kubernetes/scheduler/policy.yaml",
            ))
            .with_volume(VolumeSpec::new(
                "scheduler-config-23",
                "/etc/kubernetes/scheduler/config-23.yaml",
            ))
    }

    #[test]
    fn test_patch_injects_everything_once() {
        let patcher = ManifestPatcher::new("/tmp/kube-scheduler.yaml");
        let mut doc = ManifestDocument::from_yaml(KUBEADM_SCHEDULER).unwrap();

        let change = patcher.patch(&mut doc, &scheduler_patches()).unwrap();

        assert_eq!(change, Change::Changed);
        let command = doc.command();
        assert_eq!(
            command
                .iter()
                .filter(|arg| *arg == "--config=/etc/kubernetes/scheduler/config-23.yaml")
                .count(),
            1
        );
        assert_eq!(command.last().unwrap(), UNSCHEDULABLE_PODS_DURATION_FLAG);
        // existing entries keep their position
        assert_eq!(command[0], "kube-scheduler");
        assert_eq!(doc.volumes()[0].name, "kubeconfig");
        assert_eq!(doc.volume_mounts()[0].name, "kubeconfig");

        let volume_names: Vec<_> = doc.volumes().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(
            volume_names,
            ["kubeconfig", "scheduler-config", "scheduler-policy", "scheduler-config-23"]
        );
        let mount_names: Vec<_> = doc.volume_mounts().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            mount_names,
            ["kubeconfig", "scheduler-config", "scheduler-policy", "scheduler-config-23"]
        );
    }

    #[test]
    fn test_patch_is_idempotent() {
        let patcher = ManifestPatcher::new("/tmp/kube-scheduler.yaml");
        let patches = scheduler_patches();
        let mut doc = ManifestDocument::from_yaml(KUBEADM_SCHEDULER).unwrap();

        assert_eq!(patcher.patch(&mut doc, &patches).unwrap(), Change::Changed);
        let once = doc.clone();
        assert_eq!(patcher.patch(&mut doc, &patches).unwrap(), Change::Unchanged);
        assert_eq!(doc, once);
    }

    #[test]
    fn test_patch_reports_single_missing_mount() {
        let patcher = ManifestPatcher::new("/tmp/kube-scheduler.yaml");
        let patches = PatchSet::new("/etc/kubernetes/scheduler/config.yaml")
            .with_volume(VolumeSpec::new("kubeconfig", "/etc/kubernetes/scheduler.conf"));
        let mut doc = ManifestDocument::from_yaml(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: kube-scheduler\nspec:\n  containers:\n  - name: kube-scheduler\n    command:\n    - kube-scheduler\n    - --config=/etc/kubernetes/scheduler/config.yaml\n  volumes:\n  - name: kubeconfig\n    hostPath:\n      path: /etc/kubernetes/scheduler.conf\n",
        )
        .unwrap();

        assert_eq!(patcher.patch(&mut doc, &patches).unwrap(), Change::Changed);
        assert_eq!(doc.volumes().len(), 1);
        assert_eq!(doc.volume_mounts().len(), 1);
        assert_eq!(doc.command().len(), 2);
    }

    #[test]
    fn test_patch_matches_config_flag_exactly() {
        let patcher = ManifestPatcher::new("/tmp/kube-scheduler.yaml");
        let mut doc = ManifestDocument::from_yaml(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: kube-scheduler\nspec:\n  containers:\n  - name: kube-scheduler\n    command:\n    - --config=/etc/kubernetes/scheduler/config.yaml\n",
        )
        .unwrap();

        let change = patcher
            .patch(&mut doc, &PatchSet::new("/etc/kubernetes/scheduler/config-29.yaml"))
            .unwrap();

        assert_eq!(change, Change::Changed);
        assert!(doc.has_command_arg("--config=/etc/kubernetes/scheduler/config-29.yaml"));
    }

    #[test]
    fn test_patch_then_flush_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kube-scheduler.yaml");
        std::fs::write(&path, KUBEADM_SCHEDULER).unwrap();
        let patcher = ManifestPatcher::new(&path);
        let patches = scheduler_patches();

        let mut doc = patcher.load().unwrap();
        let change = patcher.patch(&mut doc, &patches).unwrap();
        assert!(patcher.flush(&doc, change).unwrap());

        let mut reloaded = patcher.load().unwrap();
        assert_eq!(reloaded, doc);
        let change = patcher.patch(&mut reloaded, &patches).unwrap();
        assert!(!patcher.flush(&reloaded, change).unwrap());
    }

    #[test]
    fn test_patched_manifest_keeps_newer_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kube-scheduler.yaml");
        std::fs::write(&path, NEWER_SCHEMA).unwrap();
        let patcher = ManifestPatcher::new(&path);

        let mut doc = patcher.load().unwrap();
        let change = patcher.patch(&mut doc, &scheduler_patches()).unwrap();
        assert!(patcher.flush(&doc, change).unwrap());

        let written: serde_yaml::Value =
            serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let container = &written["spec"]["containers"][0];
        assert_eq!(written["spec"]["resources"]["limits"]["cpu"], serde_yaml::Value::from("2"));
        assert_eq!(container["lifecycle"]["stopSignal"], serde_yaml::Value::from("SIGUSR1"));
        assert_eq!(
            container["volumeMounts"][2]["mountPath"],
            serde_yaml::Value::from("/etc/kubernetes/scheduler/config-23.yaml")
        );
        assert_eq!(
            written["spec"]["volumes"][0]["hostPath"]["type"],
            serde_yaml::Value::from("File")
        );
        assert_eq!(patcher.load().unwrap(), doc);
    }

    #[test]
    fn test_change_accumulates() {
        let mut change = Change::default();
        change |= Change::Unchanged;
        assert!(!change.is_changed());
        change |= Change::Changed;
        change |= Change::Unchanged;
        assert!(change.is_changed());
        assert_eq!(Change::from(true), Change::Changed);
    }
}

//! Reconciliation logic.
//!
//! One call to [`Reconciler::tick`] brings the node to the desired state:
//! verify sources, sync every file pair, load the manifest, patch it, and
//! flush plus back it up when something changed.

use crate::backup::BackupStore;
use crate::config::PatcherConfig;
use crate::error::ControllerError;
use crate::shutdown::{SharedState, ShutdownState};
use crate::sync::FileSynchronizer;
use crate::version::ClusterProfile;
use scheduler_manifest::{
    Change, ManifestPatcher, PatchSet, VolumeSpec, UNSCHEDULABLE_PODS_DURATION_FLAG,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::PoisonError;
use tracing::{debug, info};

/// Volume name of the legacy scheduler config
const CONFIG_VOLUME: &str = "scheduler-config";
/// Volume name of the scheduler policy
const POLICY_VOLUME: &str = "scheduler-policy";

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran to completion
    Completed {
        /// Targets rewritten from their sources
        files_changed: usize,
        /// Whether the manifest was modified
        manifest: Change,
        /// Whether the manifest file was written
        written: bool,
    },
    /// Shutdown already began; nothing was touched
    Skipped,
}

/// Builds the manifest patches for a cluster profile.
#[must_use]
pub fn patch_set(config: &PatcherConfig, profile: &ClusterProfile) -> PatchSet {
    let active = config.config_for(profile.bucket);
    let mut patches = PatchSet::new(&active.target)
        .with_volume(VolumeSpec::new(CONFIG_VOLUME, &config.config.target))
        .with_volume(VolumeSpec::new(POLICY_VOLUME, &config.policy.target));
    if profile.bucket.config_volume_name() != CONFIG_VOLUME {
        patches = patches.with_volume(VolumeSpec::new(
            profile.bucket.config_volume_name(),
            &active.target,
        ));
    }
    if profile.supports_unschedulable_pods_duration {
        patches = patches.with_flag(UNSCHEDULABLE_PODS_DURATION_FLAG);
    }
    patches
}

/// Reconciles the scheduler manifest and its files.
#[derive(Debug)]
pub struct Reconciler {
    synchronizer: FileSynchronizer,
    patcher: ManifestPatcher,
    patches: PatchSet,
    backup: BackupStore,
    state: SharedState,
    force_restart: bool,
    first_run: AtomicBool,
}

impl Reconciler {
    /// Creates a reconciler for `config` on a cluster matching `profile`.
    #[must_use]
    pub fn new(config: &PatcherConfig, profile: &ClusterProfile, state: SharedState) -> Self {
        let patches = patch_set(config, profile);
        info!(
            "Reconciling {} with {} ({} volumes, {} extra flags)",
            config.manifest_path.display(),
            patches.config_flag(),
            patches.volumes().len(),
            patches.extra_flags().len()
        );
        Self {
            synchronizer: FileSynchronizer::new(config.file_pairs()),
            patcher: ManifestPatcher::new(&config.manifest_path),
            patches,
            backup: BackupStore::new(&config.backup_dir),
            state,
            force_restart: config.force_restart,
            first_run: AtomicBool::new(true),
        }
    }

    /// Runs one reconciliation.
    ///
    /// Holds the shutdown lock for the whole tick.
    ///
    /// # Errors
    ///
    /// Missing sources, file copy failures, and manifest load, parse or
    /// write failures. [`ControllerError::Backup`] if the manifest was
    /// written but could not be backed up; the patch stays applied.
    pub fn tick(&self) -> Result<TickOutcome, ControllerError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ShutdownState::Terminating {
            debug!("Shutdown in progress, skipping reconciliation");
            return Ok(TickOutcome::Skipped);
        }

        self.synchronizer.verify_sources()?;
        let files_changed = self.synchronizer.sync_all()?;

        let mut doc = self.patcher.load()?;
        let manifest = self.patcher.patch(&mut doc, &self.patches)?;
        let manifest_path = self.patcher.manifest_path();

        let written = if self.force_restart && self.first_run.swap(false, Ordering::SeqCst) {
            // recreate the file so the kubelet restarts the scheduler even if nothing changed
            doc.recreate(manifest_path)?;
            true
        } else {
            self.patcher.flush(&doc, manifest)?
        };

        if written {
            let record = self.backup.save(manifest_path)?;
            debug!("Backup {} holds {} bytes", record.path.display(), record.size);
        } else {
            info!("Scheduler manifest already patched");
        }

        Ok(TickOutcome::Completed {
            files_changed,
            manifest,
            written,
        })
    }
}

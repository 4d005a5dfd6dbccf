//! Signal-driven graceful shutdown.
//!
//! The coordinator shares a lock with the reconciler: a tick holds it for its
//! whole sync-patch-flush-backup sequence, and termination takes it before
//! restoring. Restore therefore never observes a half-written manifest, and a
//! tick that starts after termination began does nothing.

use crate::backup::{BackupStore, RestoreOutcome};
use crate::error::ControllerError;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::signal;
use tracing::{error, info, warn};

/// Shutdown state shared with the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Waiting for a termination signal
    Armed,
    /// Terminating; no further manifest writes
    Terminating,
}

/// Lock guarding the manifest critical section
pub type SharedState = Arc<Mutex<ShutdownState>>;

/// Creates a new armed state.
#[must_use]
pub fn armed() -> SharedState {
    Arc::new(Mutex::new(ShutdownState::Armed))
}

/// Manifest to restore on shutdown and where its backup lives
#[derive(Debug, Clone)]
pub struct RestoreTarget {
    /// Backup store
    pub store: BackupStore,
    /// Live manifest
    pub manifest: PathBuf,
}

/// Turns a termination signal into an orderly exit.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: SharedState,
    restore: Option<RestoreTarget>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator; `restore` is `None` unless restore-on-shutdown
    /// is enabled.
    #[must_use]
    pub fn new(state: SharedState, restore: Option<RestoreTarget>) -> Self {
        Self { state, restore }
    }

    /// Waits for SIGINT or SIGTERM on `signals`, then terminates.
    ///
    /// Returns the exit code to use.
    ///
    /// # Errors
    ///
    /// [`ControllerError::Shutdown`] if listening for a signal fails.
    pub async fn run(self, mut signals: TerminationSignals) -> Result<i32, ControllerError> {
        signals.recv().await?;
        tokio::task::spawn_blocking(move || self.terminate())
            .await
            .map_err(|e| ControllerError::Shutdown(format!("termination task failed: {e}")))
    }

    /// Moves to [`ShutdownState::Terminating`] and restores the manifest if
    /// configured.
    ///
    /// Blocks until any in-flight tick releases the lock. A failed restore is
    /// logged and never retried; termination always proceeds with exit code 0.
    pub fn terminate(&self) -> i32 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ShutdownState::Terminating {
            return 0;
        }
        *state = ShutdownState::Terminating;
        info!("Shutting down");

        match &self.restore {
            Some(target) => match target.store.restore(&target.manifest) {
                Ok(RestoreOutcome::Restored(backup)) => info!(
                    "Restored {} from {} on shutdown",
                    target.manifest.display(),
                    backup.display()
                ),
                Ok(RestoreOutcome::NoBackup) => info!("No backup to restore on shutdown"),
                Err(e) => error!("Failed to restore {}: {}", target.manifest.display(), e),
            },
            None => info!("Restore on shutdown disabled"),
        }
        0
    }
}

/// Termination signal listeners.
///
/// Once installed, SIGTERM no longer kills the process and is delivered
/// through [`TerminationSignals::recv`] instead. SIGINT is watched while
/// `recv` is pending.
#[derive(Debug)]
pub struct TerminationSignals {
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl TerminationSignals {
    /// Installs the listeners. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ControllerError::Shutdown`] if a handler cannot be installed.
    pub fn install() -> Result<Self, ControllerError> {
        #[cfg(unix)]
        {
            let terminate = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(
                |e| ControllerError::Shutdown(format!("failed to install SIGTERM handler: {e}")),
            )?;
            Ok(Self { terminate })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Completes on SIGINT (Ctrl+C) or SIGTERM.
    ///
    /// # Errors
    ///
    /// [`ControllerError::Shutdown`] if listening for Ctrl+C fails.
    pub async fn recv(&mut self) -> Result<(), ControllerError> {
        #[cfg(unix)]
        {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result.map_err(|e| ControllerError::Shutdown(format!("failed to listen for SIGINT: {e}")))?;
                    warn!("Received SIGINT");
                }
                _ = self.terminate.recv() => {
                    warn!("Received SIGTERM");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c()
                .await
                .map_err(|e| ControllerError::Shutdown(format!("failed to listen for Ctrl+C: {e}")))?;
            warn!("Received Ctrl+C");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_terminate_restores_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("kube-scheduler.yaml");
        let store = BackupStore::new(dir.path().join("backup"));
        fs::write(&manifest, "applied").unwrap();
        store.save(&manifest).unwrap();
        fs::write(&manifest, "drifted").unwrap();

        let state = armed();
        let coordinator = ShutdownCoordinator::new(
            Arc::clone(&state),
            Some(RestoreTarget {
                store,
                manifest: manifest.clone(),
            }),
        );

        assert_eq!(coordinator.terminate(), 0);
        assert_eq!(fs::read_to_string(&manifest).unwrap(), "applied");
        assert_eq!(*state.lock().unwrap(), ShutdownState::Terminating);
    }

    #[test]
    fn test_terminate_without_restore_leaves_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("kube-scheduler.yaml");
        fs::write(&manifest, "live").unwrap();

        let coordinator = ShutdownCoordinator::new(armed(), None);

        assert_eq!(coordinator.terminate(), 0);
        assert_eq!(fs::read_to_string(&manifest).unwrap(), "live");
    }

    #[test]
    fn test_failed_restore_still_terminates() {
        let dir = tempfile::tempdir().unwrap();
        // backup path is a directory, so reading it fails with something other than NotFound
        let backup_dir = dir.path().join("backup");
        fs::create_dir_all(backup_dir.join("kube-scheduler.yaml")).unwrap();
        let manifest = dir.path().join("kube-scheduler.yaml");
        fs::write(&manifest, "live").unwrap();

        let state = armed();
        let coordinator = ShutdownCoordinator::new(
            Arc::clone(&state),
            Some(RestoreTarget {
                store: BackupStore::new(backup_dir),
                manifest: manifest.clone(),
            }),
        );

        assert_eq!(coordinator.terminate(), 0);
        assert_eq!(*state.lock().unwrap(), ShutdownState::Terminating);
        assert_eq!(fs::read_to_string(&manifest).unwrap(), "live");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_restores_and_exits_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("kube-scheduler.yaml");
        let store = BackupStore::new(dir.path().join("backup"));
        fs::write(&manifest, "applied").unwrap();
        store.save(&manifest).unwrap();
        fs::write(&manifest, "drifted").unwrap();
        let state = armed();
        let coordinator = ShutdownCoordinator::new(
            Arc::clone(&state),
            Some(RestoreTarget {
                store,
                manifest: manifest.clone(),
            }),
        );

        let signals = TerminationSignals::install().unwrap();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let code = tokio::time::timeout(std::time::Duration::from_secs(5), coordinator.run(signals))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(&manifest).unwrap(), "applied");
        assert_eq!(*state.lock().unwrap(), ShutdownState::Terminating);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("kube-scheduler.yaml");
        let store = BackupStore::new(dir.path().join("backup"));
        fs::write(&manifest, "applied").unwrap();
        store.save(&manifest).unwrap();
        let coordinator = ShutdownCoordinator::new(
            armed(),
            Some(RestoreTarget {
                store,
                manifest: manifest.clone(),
            }),
        );

        coordinator.terminate();
        fs::write(&manifest, "changed after termination").unwrap();
        coordinator.terminate();

        assert_eq!(fs::read_to_string(&manifest).unwrap(), "changed after termination");
    }
}

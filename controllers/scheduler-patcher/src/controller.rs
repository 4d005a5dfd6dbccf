//! Main controller implementation.
//!
//! This module contains the `Controller` struct that drives the
//! reconciliation loop for the Scheduler Patcher: one tick immediately, then
//! one per interval, forever. A fatal tick error ends the loop; the surrounding
//! orchestrator restarts the process. Recoverable errors, such as a failed
//! backup after a successful patch, are logged and the loop goes on.

use crate::error::{ControllerError, Severity};
use crate::reconciler::{Reconciler, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Periodic driver around a [`Reconciler`].
#[derive(Debug)]
pub struct Controller {
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

impl Controller {
    /// Creates a new controller instance.
    #[must_use]
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            interval,
        }
    }

    /// Runs one tick on the blocking pool.
    ///
    /// # Errors
    ///
    /// Any tick error, or [`ControllerError::Reconciliation`] if the tick task
    /// panicked.
    pub async fn reconcile_once(&self) -> Result<TickOutcome, ControllerError> {
        let reconciler = Arc::clone(&self.reconciler);
        tokio::task::spawn_blocking(move || reconciler.tick())
            .await
            .map_err(|e| ControllerError::Reconciliation(format!("reconcile task failed: {e}")))?
    }

    /// Runs the reconciliation loop until a tick fails fatally.
    ///
    /// # Errors
    ///
    /// The first fatal tick error.
    pub async fn run(&self) -> Result<(), ControllerError> {
        info!("Scheduler Patcher running (interval {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.reconcile_once().await {
                Ok(TickOutcome::Completed {
                    files_changed,
                    manifest,
                    written,
                }) => debug!(
                    "Reconciliation complete: {} files updated, manifest {:?}, written: {}",
                    files_changed, manifest, written
                ),
                Ok(TickOutcome::Skipped) => {
                    debug!("Reconciliation skipped, shutdown in progress");
                }
                Err(e) if e.severity() == Severity::Recoverable => {
                    warn!("Reconciliation degraded: {}", e);
                }
                Err(e) => {
                    error!("Reconciliation failed: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

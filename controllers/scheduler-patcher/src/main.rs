//! Scheduler Patcher
//!
//! Node-local controller that keeps the kube-scheduler static pod configured
//! with externally supplied config and policy files:
//! - Copies each source file to its host target whenever they differ
//! - Patches the static pod manifest with the `--config` flag, the version
//!   gated scheduler flags and the required host file volumes
//! - Backs up the applied manifest and optionally restores it on shutdown
//!
//! The kubelet owns static pods, so the manifest file is edited directly
//! instead of going through the API server.

mod backup;
mod config;
mod controller;
mod error;
mod reconciler;
mod shutdown;
mod sync;
mod version;


use anyhow::Context;
use clap::Parser;
use config::{Cli, LogFormat, PatcherConfig};
use controller::Controller;
use reconciler::Reconciler;
use shutdown::{RestoreTarget, ShutdownCoordinator, TerminationSignals};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use version::{ClusterVersionProbe, KubeVersionSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PatcherConfig::try_from(Cli::parse())?;
    init_tracing(&config);

    info!("Starting Scheduler Patcher");
    info!("Configuration:");
    info!("  Manifest: {}", config.manifest_path.display());
    info!("  Backup directory: {}", config.backup_dir.display());
    info!("  Interval: {:?}", config.interval);
    info!("  Restore on shutdown: {}", config.restore_on_shutdown);

    // kube uses rustls; select the ring provider before the first connection
    let _ = rustls::crypto::ring::default_provider().install_default();

    let signals = TerminationSignals::install().context("failed to install signal handlers")?;
    let state = shutdown::armed();
    let coordinator = ShutdownCoordinator::new(
        Arc::clone(&state),
        config.restore_on_shutdown.then(|| RestoreTarget {
            store: backup::BackupStore::new(&config.backup_dir),
            manifest: config.manifest_path.clone(),
        }),
    );

    let run = async {
        let source = KubeVersionSource::try_default()
            .await
            .context("failed to create Kubernetes client")?;
        let profile = ClusterVersionProbe::new(source)
            .resolve()
            .await
            .context("failed to determine cluster version")?;

        let reconciler = Reconciler::new(&config, &profile, state);
        Controller::new(reconciler, config.interval)
            .run()
            .await
            .context("reconciliation failed")
    };

    tokio::select! {
        result = run => {
            if let Err(e) = &result {
                error!("{:#}", e);
            }
            result
        }
        code = coordinator.run(signals) => {
            let code = code.context("shutdown failed")?;
            info!("Scheduler Patcher stopped");
            std::process::exit(code);
        }
    }
}

fn init_tracing(config: &PatcherConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_ansi(false).init(),
    }
}

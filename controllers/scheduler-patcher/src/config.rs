//! Command-line and environment configuration.
//!
//! Flags are parsed once at startup into an immutable [`PatcherConfig`] that
//! is shared by reference with every component.

use crate::error::ControllerError;
use clap::{Parser, ValueEnum};
use scheduler_manifest::SchemaBucket;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Keeps the kube-scheduler static pod patched with externally supplied
/// configuration and policy files.
#[derive(Debug, Clone, Parser)]
#[command(name = "scheduler-patcher")]
#[command(version)]
pub struct Cli {
    /// Path to the scheduler static pod manifest
    #[arg(long, env = "MANIFEST_PATH", default_value = "/etc/kubernetes/manifests/kube-scheduler.yaml")]
    pub manifest: PathBuf,

    /// Source path of the legacy scheduler config file
    #[arg(long, env = "SOURCE_CONFIG_PATH", default_value = "/config/config.yaml")]
    pub source_config_path: PathBuf,

    /// Target path of the legacy scheduler config file
    #[arg(long, env = "TARGET_CONFIG_PATH", default_value = "/etc/kubernetes/scheduler/config.yaml")]
    pub target_config_path: PathBuf,

    /// Source path of the scheduler policy file
    #[arg(long, env = "SOURCE_POLICY_PATH", default_value = "/config/policy.yaml")]
    pub source_policy_path: PathBuf,

    /// Target path of the scheduler policy file
    #[arg(long, env = "TARGET_POLICY_PATH", default_value = "/etc/kubernetes/scheduler/policy.yaml")]
    pub target_policy_path: PathBuf,

    /// Source path of the scheduler config for Kubernetes 1.19 - 1.22
    #[arg(long = "source-config-19-path", env = "SOURCE_CONFIG_19_PATH", default_value = "/config/config-19.yaml")]
    pub source_config_19_path: PathBuf,

    /// Target path of the scheduler config for Kubernetes 1.19 - 1.22
    #[arg(long = "target-config-19-path", env = "TARGET_CONFIG_19_PATH", default_value = "/etc/kubernetes/scheduler/config-19.yaml")]
    pub target_config_19_path: PathBuf,

    /// Source path of the scheduler config for Kubernetes 1.23 - 1.28
    #[arg(long = "source-config-23-path", env = "SOURCE_CONFIG_23_PATH", default_value = "/config/config-23.yaml")]
    pub source_config_23_path: PathBuf,

    /// Target path of the scheduler config for Kubernetes 1.23 - 1.28
    #[arg(long = "target-config-23-path", env = "TARGET_CONFIG_23_PATH", default_value = "/etc/kubernetes/scheduler/config-23.yaml")]
    pub target_config_23_path: PathBuf,

    /// Source path of the scheduler config for Kubernetes 1.29+
    #[arg(long = "source-config-29-path", env = "SOURCE_CONFIG_29_PATH", default_value = "/config/config-29.yaml")]
    pub source_config_29_path: PathBuf,

    /// Target path of the scheduler config for Kubernetes 1.29+
    #[arg(long = "target-config-29-path", env = "TARGET_CONFIG_29_PATH", default_value = "/etc/kubernetes/scheduler/config-29.yaml")]
    pub target_config_29_path: PathBuf,

    /// Directory holding the manifest backup
    #[arg(long, env = "BACKUP_PATH", default_value = "/etc/kubernetes/scheduler")]
    pub backup_path: PathBuf,

    /// Reconciliation interval in seconds
    #[arg(long, env = "SYNC_INTERVAL", default_value_t = 60)]
    pub interval: u64,

    /// Restore the manifest from backup on shutdown
    #[arg(long, env = "RESTORE_ON_SHUTDOWN")]
    pub restore: bool,

    /// Recreate the manifest on the first reconciliation to force a scheduler restart
    #[arg(long, env = "FORCE_RESTART")]
    pub force_restart: bool,

    /// Log level (trace, debug, info, warn, error; legacy names are mapped)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub loglevel: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Plain text
    Text,
}

/// A declared source-of-truth file and where it is deployed on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    /// Source-of-truth file
    pub source: PathBuf,
    /// Deployment target on the host
    pub target: PathBuf,
}

impl FilePair {
    /// Creates a pair.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Supported log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// trace
    Trace,
    /// debug
    Debug,
    /// info
    Info,
    /// warn
    Warn,
    /// error
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this level
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Maps a configured level name to the nearest supported level.
///
/// Unknown names fall back to `info` instead of being rejected.
#[must_use]
pub fn normalize_log_level(raw: &str) -> LogLevel {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" | "notset" | "all" => LogLevel::Trace,
        "debug" | "verbose" => LogLevel::Debug,
        "warn" | "warning" => LogLevel::Warn,
        "error" | "fatal" | "critical" | "panic" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

/// Immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct PatcherConfig {
    /// Scheduler static pod manifest
    pub manifest_path: PathBuf,
    /// Legacy scheduler config
    pub config: FilePair,
    /// Scheduler policy
    pub policy: FilePair,
    /// Scheduler config for 1.19 - 1.22
    pub config_19: FilePair,
    /// Scheduler config for 1.23 - 1.28
    pub config_23: FilePair,
    /// Scheduler config for 1.29+
    pub config_29: FilePair,
    /// Backup directory
    pub backup_dir: PathBuf,
    /// Reconciliation period
    pub interval: Duration,
    /// Restore the manifest from backup on shutdown
    pub restore_on_shutdown: bool,
    /// Recreate the manifest once on the first tick
    pub force_restart: bool,
    /// Normalized log level
    pub log_level: LogLevel,
    /// Log output format
    pub log_format: LogFormat,
}

impl PatcherConfig {
    /// Every declared file pair, synchronized on each tick.
    #[must_use]
    pub fn file_pairs(&self) -> Vec<FilePair> {
        vec![
            self.config.clone(),
            self.policy.clone(),
            self.config_19.clone(),
            self.config_23.clone(),
            self.config_29.clone(),
        ]
    }

    /// File pair carrying the scheduler config for `bucket`.
    #[must_use]
    pub fn config_for(&self, bucket: SchemaBucket) -> &FilePair {
        match bucket {
            SchemaBucket::Legacy => &self.config,
            SchemaBucket::Gen19 => &self.config_19,
            SchemaBucket::Gen23 => &self.config_23,
            SchemaBucket::Gen29 => &self.config_29,
        }
    }
}

impl TryFrom<Cli> for PatcherConfig {
    type Error = ControllerError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.interval == 0 {
            return Err(ControllerError::InvalidConfig(
                "--interval must be at least 1 second".to_string(),
            ));
        }

        let config = PatcherConfig {
            manifest_path: cli.manifest,
            config: FilePair::new(cli.source_config_path, cli.target_config_path),
            policy: FilePair::new(cli.source_policy_path, cli.target_policy_path),
            config_19: FilePair::new(cli.source_config_19_path, cli.target_config_19_path),
            config_23: FilePair::new(cli.source_config_23_path, cli.target_config_23_path),
            config_29: FilePair::new(cli.source_config_29_path, cli.target_config_29_path),
            backup_dir: cli.backup_path,
            interval: Duration::from_secs(cli.interval),
            restore_on_shutdown: cli.restore,
            force_restart: cli.force_restart,
            log_level: normalize_log_level(&cli.loglevel),
            log_format: cli.log_format,
        };

        require_absolute("manifest", &config.manifest_path)?;
        require_absolute("backup-path", &config.backup_dir)?;
        for pair in config.file_pairs() {
            require_absolute("source", &pair.source)?;
            require_absolute("target", &pair.target)?;
        }
        if config.manifest_path.file_name().is_none() {
            return Err(ControllerError::InvalidConfig(format!(
                "manifest path {} has no file name",
                config.manifest_path.display()
            )));
        }

        Ok(config)
    }
}

fn require_absolute(what: &str, path: &Path) -> Result<(), ControllerError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ControllerError::InvalidConfig(format!(
            "{what} path {} must be absolute",
            path.display()
        )))
    }
}

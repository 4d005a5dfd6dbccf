//! Cluster version probe.
//!
//! Queries the API server `/version` endpoint once at startup and derives the
//! scheduler schema bucket. There is no fallback; any failure is fatal.

use crate::error::ControllerError;
use kube::Client;
use scheduler_manifest::{supports_unschedulable_pods_duration, KubeVersion, SchemaBucket};
use tracing::info;

/// Raw version components as reported by the API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    /// Major version, e.g. `"1"`
    pub major: String,
    /// Minor version, e.g. `"27"` or `"27+"`
    pub minor: String,
}

/// Source of the API server version.
///
/// Abstracted so the probe can be tested without a cluster.
#[async_trait::async_trait]
pub trait VersionSource: Send + Sync {
    /// Fetches the server version.
    async fn server_version(&self) -> Result<ServerVersion, ControllerError>;
}

/// [`VersionSource`] backed by the Kubernetes API
pub struct KubeVersionSource {
    client: Client,
}

impl KubeVersionSource {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the in-cluster or kubeconfig environment.
    ///
    /// # Errors
    ///
    /// [`ControllerError::Kube`] if no client configuration is available.
    pub async fn try_default() -> Result<Self, ControllerError> {
        Ok(Self::new(Client::try_default().await?))
    }
}

#[async_trait::async_trait]
impl VersionSource for KubeVersionSource {
    async fn server_version(&self) -> Result<ServerVersion, ControllerError> {
        let info = self.client.apiserver_version().await?;
        Ok(ServerVersion {
            major: info.major,
            minor: info.minor,
        })
    }
}

/// Everything derived from the cluster version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterProfile {
    /// Parsed server version
    pub version: KubeVersion,
    /// Active schema bucket
    pub bucket: SchemaBucket,
    /// Whether `--pod-max-in-unschedulable-pods-duration` is accepted
    pub supports_unschedulable_pods_duration: bool,
}

impl ClusterProfile {
    /// Derives the profile from a version.
    #[must_use]
    pub fn for_version(version: KubeVersion) -> Self {
        Self {
            version,
            bucket: SchemaBucket::resolve(version),
            supports_unschedulable_pods_duration: supports_unschedulable_pods_duration(version),
        }
    }
}

/// Resolves the [`ClusterProfile`] from a [`VersionSource`].
#[derive(Debug)]
pub struct ClusterVersionProbe<S> {
    source: S,
}

impl<S: VersionSource> ClusterVersionProbe<S> {
    /// Creates a probe over `source`.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Queries the server version and resolves the profile.
    ///
    /// # Errors
    ///
    /// [`ControllerError::VersionProbe`] if the query fails or the reported
    /// version is not numeric.
    pub async fn resolve(&self) -> Result<ClusterProfile, ControllerError> {
        let raw = self
            .source
            .server_version()
            .await
            .map_err(|e| ControllerError::VersionProbe(e.to_string()))?;
        let version = KubeVersion::parse(&raw.major, &raw.minor)
            .map_err(|e| ControllerError::VersionProbe(e.to_string()))?;
        let profile = ClusterProfile::for_version(version);
        info!(
            "Detected Kubernetes {} (schema bucket {}, unschedulable pods duration flag: {})",
            profile.version, profile.bucket, profile.supports_unschedulable_pods_duration
        );
        Ok(profile)
    }
}

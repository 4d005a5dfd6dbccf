//! Kubernetes version to scheduler configuration schema mapping.
//!
//! The kube-scheduler `--config` file format and flag set changed several
//! times between minor releases. Each generation is a [`SchemaBucket`]; the
//! bucket is derived once per process from the API server version.

use crate::error::ManifestError;
use std::fmt;

/// Flag that caps how long a pod may sit in the unschedulable queue
pub const UNSCHEDULABLE_PODS_DURATION_FLAG: &str = "--pod-max-in-unschedulable-pods-duration=60s";

/// Kubernetes `major.minor` version as reported by the API server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KubeVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
}

impl KubeVersion {
    /// Creates a version from already-parsed components.
    #[must_use]
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses the string-encoded components returned by the `/version` endpoint.
    ///
    /// Managed distributions report minors such as `"27+"`; trailing
    /// non-digit characters are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidVersion`] if either component has no
    /// leading digits.
    pub fn parse(major: &str, minor: &str) -> Result<Self, ManifestError> {
        let invalid = || ManifestError::InvalidVersion {
            major: major.to_string(),
            minor: minor.to_string(),
        };
        Ok(Self {
            major: leading_number(major).ok_or_else(invalid)?,
            minor: leading_number(minor).ok_or_else(invalid)?,
        })
    }
}

impl fmt::Display for KubeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

fn leading_number(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

/// Generation of the scheduler configuration format and flag set.
///
/// Ordering follows release order, so `Legacy < Gen19 < Gen23 < Gen29`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaBucket {
    /// 1.18 and older, policy file driven
    Legacy,
    /// 1.19 through 1.22
    Gen19,
    /// 1.23 through 1.28
    Gen23,
    /// 1.29 and newer
    Gen29,
}

impl SchemaBucket {
    /// Lower bound (inclusive minor, for major 1) of every non-legacy bucket,
    /// oldest first.
    const THRESHOLDS: [(u32, SchemaBucket); 3] = [
        (19, SchemaBucket::Gen19),
        (23, SchemaBucket::Gen23),
        (29, SchemaBucket::Gen29),
    ];

    /// Resolves the newest bucket whose lower bound is at or below `version`.
    ///
    /// Total over all versions: anything before 1.19 (including a major of 0)
    /// is [`SchemaBucket::Legacy`], any major above 1 is the newest bucket.
    #[must_use]
    pub fn resolve(version: KubeVersion) -> Self {
        match version.major {
            0 => SchemaBucket::Legacy,
            1 => Self::THRESHOLDS
                .iter()
                .rev()
                .find(|(threshold, _)| version.minor >= *threshold)
                .map_or(SchemaBucket::Legacy, |(_, bucket)| *bucket),
            _ => SchemaBucket::Gen29,
        }
    }

    /// Name of the manifest volume carrying this bucket's config file.
    #[must_use]
    pub fn config_volume_name(self) -> &'static str {
        match self {
            SchemaBucket::Legacy => "scheduler-config",
            SchemaBucket::Gen19 => "scheduler-config-19",
            SchemaBucket::Gen23 => "scheduler-config-23",
            SchemaBucket::Gen29 => "scheduler-config-29",
        }
    }
}

impl fmt::Display for SchemaBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaBucket::Legacy => "legacy",
            SchemaBucket::Gen19 => "v1.19",
            SchemaBucket::Gen23 => "v1.23",
            SchemaBucket::Gen29 => "v1.29",
        };
        f.write_str(name)
    }
}

/// Whether the scheduler accepts [`UNSCHEDULABLE_PODS_DURATION_FLAG`].
///
/// The flag is version gated upstream and its lifetime is not settled;
/// adjust this check alone when that changes.
#[must_use]
pub fn supports_unschedulable_pods_duration(version: KubeVersion) -> bool {
    version.major > 1 || (version.major == 1 && version.minor > 23)
}

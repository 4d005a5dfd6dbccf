//! Scheduler Manifest
//!
//! Typed model and idempotent patching for the kube-scheduler static pod
//! manifest managed by the kubelet.
//!
//! This crate provides:
//! - **Schema buckets**: which generation of `--config` file format applies to a
//!   given Kubernetes version ([`SchemaBucket`])
//! - **Volume specs**: the `volume` + `volumeMount` pair needed to expose a host
//!   file inside the scheduler container ([`VolumeSpec`])
//! - **Manifest documents**: a validated, typed view over the on-disk Pod that
//!   writes back every field it read
//!   ([`ManifestDocument`])
//! - **Patching**: idempotent flag and volume injection ([`ManifestPatcher`])
//!
//! # Example
//!
//! ```no_run
//! use scheduler_manifest::{KubeVersion, ManifestPatcher, PatchSet, SchemaBucket, VolumeSpec};
//!
//! # fn example() -> Result<(), scheduler_manifest::ManifestError> {
//! let version = KubeVersion::parse("1", "27")?;
//! assert_eq!(SchemaBucket::resolve(version), SchemaBucket::Gen23);
//!
//! let patcher = ManifestPatcher::new("/etc/kubernetes/manifests/kube-scheduler.yaml");
//! let mut doc = patcher.load()?;
//! let patches = PatchSet::new("/etc/kubernetes/scheduler/config-23.yaml")
//!     .with_volume(VolumeSpec::new("scheduler-config-23", "/etc/kubernetes/scheduler/config-23.yaml"));
//! let change = patcher.patch(&mut doc, &patches)?;
//! patcher.flush(&doc, change)?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod bucket;
pub mod error;
pub mod manifest;
pub mod patcher;
pub mod volume;

pub use bucket::*;
pub use error::*;
pub use manifest::*;
pub use patcher::*;
pub use volume::*;

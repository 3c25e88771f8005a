//! Plain data types describing a policy. No behavior beyond
//! accessors: parsing lives in [`super::parser`], enforcement in
//! [`crate::enforcer`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum NetworkMode {
    #[default]
    Disabled,
    Loopback,
    Outbound,
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum FilesystemRight {
    Read,
    Write,
    Execute,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    pub cpu_count: Option<u32>,
    pub memory_bytes: Option<u64>,
    pub max_processes: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MountType {
    Bind,
    Tmpfs,
    Overlay,
    Proc,
    Sysfs,
    Devtmpfs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MountEntry {
    pub source: String,
    pub destination: String,
    #[serde(rename = "type")]
    pub kind: MountType,
    pub mode: MountMode,
    #[serde(default)]
    pub options: Vec<String>,
    pub overlay_lower: Option<String>,
    pub overlay_upper: Option<String>,
    pub overlay_work: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CapabilityGrant {
    #[serde(default)]
    pub network_mode: NetworkMode,
    #[serde(default)]
    pub filesystem_rights: BTreeSet<FilesystemRight>,
    #[serde(default)]
    pub allowed_paths: BTreeSet<PathBuf>,
    #[serde(default)]
    pub denied_paths: BTreeSet<PathBuf>,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SandboxConfig {
    pub root_path: PathBuf,
    #[serde(default)]
    pub mounts: Vec<MountEntry>,
    pub hostname: Option<String>,
    pub working_directory: Option<PathBuf>,
    /// Ordered, keys unique - enforced in [`super::validator::validate`],
    /// not by the map type itself.
    #[serde(default)]
    pub environment: Vec<(String, String)>,
}

pub fn default_version() -> String {
    "1.0.0".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Policy {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub description: Option<String>,
    #[serde(default)]
    pub capability_grant: CapabilityGrant,
    #[serde(default)]
    pub sandbox_config: SandboxConfig,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Relative name, absolute path, or tilde-expanded path.
    pub rootfs_image: Option<String>,
}

impl Policy {
    pub fn is_networked(&self) -> bool {
        matches!(
            self.capability_grant.network_mode,
            NetworkMode::Outbound | NetworkMode::Full
        )
    }
}

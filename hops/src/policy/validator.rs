//! Policy Validator (V, validate half): rejects insecure or malformed
//! policies before they reach the engine.

use super::model::{MountMode, MountType, Policy};
use hops_shared::errors::{HopsError, HopsResult};
use std::path::{Path, PathBuf};

const VERSION_RE_GROUPS: usize = 3;

/// Fixed, configuration-visible list of host paths whose presence in any
/// mount (symlink-resolved) makes the policy invalid (the "sensitive path
/// set").
pub const SENSITIVE_PATHS: &[&str] = &[
    "/etc/shadow",
    "/etc/passwd",
    "/etc/ssh",
    "/root/.ssh",
    "/var/run/secrets",
    "/run/secrets",
    "/var/run/docker.sock",
];

const CPU_RANGE: std::ops::RangeInclusive<u32> = 1..=16;
const MEMORY_RANGE: std::ops::RangeInclusive<u64> = (1 << 20)..=(8u64 << 30);
const PROCESSES_RANGE: std::ops::RangeInclusive<u32> = 1..=1024;

pub fn validate(policy: &Policy) -> HopsResult<()> {
    validate_name(&policy.name)?;
    validate_version(&policy.version)?;
    validate_absolute(&policy.sandbox_config.root_path, "sandbox_config.root_path")?;
    if let Some(wd) = &policy.sandbox_config.working_directory {
        validate_absolute(wd, "sandbox_config.working_directory")?;
    }

    for path in &policy.capability_grant.allowed_paths {
        validate_absolute(path, "capability_grant.allowed_paths")?;
    }
    for path in &policy.capability_grant.denied_paths {
        validate_absolute(path, "capability_grant.denied_paths")?;
    }
    validate_disjoint_paths(
        &policy.capability_grant.allowed_paths,
        &policy.capability_grant.denied_paths,
    )?;

    validate_resource_limits(policy)?;
    validate_mounts(policy)?;

    if let Some(rootfs) = &policy.rootfs_image {
        resolve_rootfs_reference(rootfs).and_then(|p| {
            if p.exists() {
                Ok(())
            } else {
                Err(HopsError::Configuration(format!(
                    "RootfsNotFound: resolved rootfs image does not exist: {}",
                    p.display()
                )))
            }
        })?;
    }

    Ok(())
}

fn validate_name(name: &str) -> HopsResult<()> {
    if name.trim().is_empty() {
        return Err(HopsError::Configuration(
            "EmptyName: policy name must be non-empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_version(version: &str) -> HopsResult<()> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != VERSION_RE_GROUPS || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(HopsError::Configuration(format!(
            "InvalidVersion: '{version}' does not match MAJOR.MINOR.PATCH"
        )));
    }
    Ok(())
}

fn validate_absolute(path: &Path, field: &str) -> HopsResult<()> {
    if !path.is_absolute() {
        return Err(HopsError::Configuration(format!(
            "NonAbsolutePath: {field} must be absolute, got {}",
            path.display()
        )));
    }
    Ok(())
}

/// allowedPaths and deniedPaths are disjoint in the prefix sense: after
/// canonicalization, no path in one set is a prefix of any path in the
/// other.
fn validate_disjoint_paths(
    allowed: &std::collections::BTreeSet<PathBuf>,
    denied: &std::collections::BTreeSet<PathBuf>,
) -> HopsResult<()> {
    for a in allowed {
        for d in denied {
            if is_prefix_of(a, d) || is_prefix_of(d, a) {
                return Err(HopsError::Isolation(format!(
                    "ConflictingPaths: allowed path {} conflicts with denied path {}",
                    a.display(),
                    d.display()
                )));
            }
        }
    }
    Ok(())
}

fn is_prefix_of(prefix: &Path, candidate: &Path) -> bool {
    normalize_lexically(candidate).starts_with(normalize_lexically(prefix))
}

/// Resolves `.`/`..` components without touching the filesystem, so paths
/// that don't yet exist on disk (mount destinations, not-yet-created
/// directories) still get a meaningful prefix comparison. A leading `..`
/// past the root is dropped rather than escaping it, matching how an
/// absolute path would actually resolve on the host.
fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !matches!(out.components().next_back(), Some(Component::RootDir) | None) {
                    out.pop();
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn validate_resource_limits(policy: &Policy) -> HopsResult<()> {
    let limits = &policy.capability_grant.resource_limits;
    if let Some(cpus) = limits.cpu_count
        && !CPU_RANGE.contains(&cpus)
    {
        return Err(HopsError::Resource(format!(
            "ResourceLimitOutOfRange: cpuCount {cpus} outside {:?}",
            CPU_RANGE
        )));
    }
    if let Some(mem) = limits.memory_bytes
        && !MEMORY_RANGE.contains(&mem)
    {
        return Err(HopsError::Resource(format!(
            "ResourceLimitOutOfRange: memoryBytes {mem} outside {:?}",
            MEMORY_RANGE
        )));
    }
    if let Some(procs) = limits.max_processes
        && !PROCESSES_RANGE.contains(&procs)
    {
        return Err(HopsError::Resource(format!(
            "ResourceLimitOutOfRange: maxProcesses {procs} outside {:?}",
            PROCESSES_RANGE
        )));
    }
    Ok(())
}

fn validate_mounts(policy: &Policy) -> HopsResult<()> {
    let mounts = &policy.sandbox_config.mounts;

    for (i, mount) in mounts.iter().enumerate() {
        if mount.kind == MountType::Bind {
            let source = PathBuf::from(&mount.source);
            validate_absolute(&source, &format!("sandbox_config.mounts[{i}].source"))?;
            validate_absolute(
                &PathBuf::from(&mount.destination),
                &format!("sandbox_config.mounts[{i}].destination"),
            )?;
            if !source.exists() {
                return Err(HopsError::Configuration(format!(
                    "InsecureMountConfiguration: bind mount source does not exist: {}",
                    source.display()
                )));
            }
            check_symlink_not_sensitive(&source)?;

            let dest = normalize_lexically(&PathBuf::from(&mount.destination));
            if mount.mode == MountMode::ReadWrite && overlaps_sensitive(&dest) {
                return Err(HopsError::Isolation(format!(
                    "InsecureMountConfiguration: read-write mount destination {} overlaps a sensitive path",
                    dest.display()
                )));
            }
        }
    }

    for i in 0..mounts.len() {
        for j in (i + 1)..mounts.len() {
            let a = normalize_lexically(&PathBuf::from(&mounts[i].destination));
            let b = normalize_lexically(&PathBuf::from(&mounts[j].destination));
            if is_prefix_of(&a, &b) || is_prefix_of(&b, &a) {
                return Err(HopsError::Configuration(format!(
                    "ConflictingPaths: mount destinations overlap: {} and {}",
                    a.display(),
                    b.display()
                )));
            }
        }
    }

    Ok(())
}

/// If `source` is a symlink, its resolved target must not overlap (equal,
/// prefix, or suffix) any entry in [`SENSITIVE_PATHS`].
fn check_symlink_not_sensitive(source: &Path) -> HopsResult<()> {
    let Ok(meta) = std::fs::symlink_metadata(source) else {
        return Ok(());
    };
    if !meta.file_type().is_symlink() {
        return Ok(());
    }
    let Ok(resolved) = std::fs::canonicalize(source) else {
        return Ok(());
    };
    if overlaps_sensitive(&resolved) {
        return Err(HopsError::Isolation(format!(
            "InsecureMountConfiguration: symlink {} resolves to sensitive path {}",
            source.display(),
            resolved.display()
        )));
    }
    Ok(())
}

fn overlaps_sensitive(path: &Path) -> bool {
    SENSITIVE_PATHS.iter().any(|sensitive| {
        let sensitive = Path::new(sensitive);
        path == sensitive || path.starts_with(sensitive) || sensitive.starts_with(path)
    })
}

/// Resolve a rootfs reference: `/`-prefixed is absolute,
/// `~`-prefixed expands home, otherwise a name under `<state-dir>/rootfs/`.
pub fn resolve_rootfs_reference(reference: &str) -> HopsResult<PathBuf> {
    resolve_rootfs_reference_in(reference, &hops_shared::StateLayout::resolve_default())
}

/// As [`resolve_rootfs_reference`], but resolves a named reference against
/// a specific layout rather than the process-default state directory.
pub fn resolve_rootfs_reference_with_layout(
    reference: &str,
    layout: &hops_shared::StateLayout,
) -> HopsResult<PathBuf> {
    resolve_rootfs_reference_in(reference, &Some(layout.clone()))
}

fn resolve_rootfs_reference_in(
    reference: &str,
    layout: &Option<hops_shared::StateLayout>,
) -> HopsResult<PathBuf> {
    if let Some(rest) = reference.strip_prefix('/') {
        Ok(PathBuf::from("/").join(rest))
    } else if let Some(rest) = reference.strip_prefix('~') {
        let home = dirs::home_dir().ok_or_else(|| {
            HopsError::Configuration("cannot expand '~': no home directory".to_string())
        })?;
        Ok(home.join(rest.trim_start_matches('/')))
    } else {
        let layout = layout.as_ref().ok_or_else(|| {
            HopsError::Configuration("cannot resolve rootfs name: no state directory".to_string())
        })?;
        Ok(layout.named_rootfs(reference))
    }
}

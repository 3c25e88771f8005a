//! Conversions between wire (`hops_shared::generated`) and internal
//! (`crate::policy`, `crate::sandbox`) types. Every conversion is total in
//! one direction (internal -> wire, for status projections) or fallible in
//! the other (wire -> internal, since a client can send out-of-range enum
//! values or a malformed policy).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::SystemTime;

use hops_shared::errors::{HopsError, HopsResult};
use hops_shared::generated;

use crate::policy::model::default_version;
use crate::policy::{
    CapabilityGrant, FilesystemRight, MountEntry, MountMode, MountType, NetworkMode, Policy,
    ResourceLimits, SandboxConfig,
};
use crate::sandbox::{ContainerState, ContainerSummary};

pub fn policy_from_inline(proto: &generated::InlinePolicy) -> HopsResult<Policy> {
    let capability_grant = proto
        .capability_grant
        .as_ref()
        .map(capability_grant_from_wire)
        .transpose()?
        .unwrap_or_default();
    let sandbox_config = proto
        .sandbox_config
        .as_ref()
        .map(sandbox_config_from_wire)
        .transpose()?
        .unwrap_or_default();

    Ok(Policy {
        name: proto.name.clone(),
        version: if proto.version.is_empty() {
            default_version()
        } else {
            proto.version.clone()
        },
        description: proto.description.clone(),
        capability_grant,
        sandbox_config,
        metadata: proto
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<BTreeMap<_, _>>(),
        rootfs_image: proto.rootfs_image.clone(),
    })
}

/// Build the internal policy and command for one `RunRequest`, folding the
/// top-level `workingDirectory` into `sandbox_config.root_path` (the
/// host-side sandbox root S provisions into the guest) - the wire message
/// carries it separately from the nested policy so a client can override
/// an inline policy's default root without rebuilding the whole policy.
/// This is distinct from `sandbox_config.working_directory`, the guest
/// process's cwd, which only ever comes from the inline policy itself.
pub fn policy_and_command_from_run_request(
    req: &generated::RunRequest,
) -> HopsResult<(Policy, Vec<String>)> {
    let inline = req
        .inline_policy
        .as_ref()
        .ok_or_else(|| HopsError::Configuration("missing inline_policy".to_string()))?;
    let mut policy = policy_from_inline(inline)?;
    if !req.working_directory.is_empty() {
        policy.sandbox_config.root_path = PathBuf::from(&req.working_directory);
    }
    crate::policy::validate(&policy)?;
    Ok((policy, req.command.clone()))
}

fn capability_grant_from_wire(proto: &generated::CapabilityGrant) -> HopsResult<CapabilityGrant> {
    let network_mode = network_mode_from_wire(proto.network_mode)?;
    let filesystem_rights = proto
        .filesystem_rights
        .iter()
        .map(|&v| filesystem_right_from_wire(v))
        .collect::<HopsResult<BTreeSet<_>>>()?;
    let allowed_paths = proto.allowed_paths.iter().map(PathBuf::from).collect();
    let denied_paths = proto.denied_paths.iter().map(PathBuf::from).collect();
    let resource_limits = proto
        .resource_limits
        .as_ref()
        .map(|r| ResourceLimits {
            cpu_count: r.cpu_count,
            memory_bytes: r.memory_bytes,
            max_processes: r.max_processes,
        })
        .unwrap_or_default();

    Ok(CapabilityGrant {
        network_mode,
        filesystem_rights,
        allowed_paths,
        denied_paths,
        resource_limits,
    })
}

fn sandbox_config_from_wire(proto: &generated::SandboxConfig) -> HopsResult<SandboxConfig> {
    let mounts = proto
        .mounts
        .iter()
        .map(mount_entry_from_wire)
        .collect::<HopsResult<Vec<_>>>()?;

    Ok(SandboxConfig {
        root_path: PathBuf::from(&proto.root_path),
        mounts,
        hostname: proto.hostname.clone(),
        working_directory: proto.working_directory.clone().map(PathBuf::from),
        environment: proto
            .environment
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect(),
    })
}

fn mount_entry_from_wire(proto: &generated::MountEntry) -> HopsResult<MountEntry> {
    Ok(MountEntry {
        source: proto.source.clone(),
        destination: proto.destination.clone(),
        kind: mount_type_from_wire(proto.r#type)?,
        mode: mount_mode_from_wire(proto.mode)?,
        options: proto.options.clone(),
        overlay_lower: proto.overlay_lower.clone(),
        overlay_upper: proto.overlay_upper.clone(),
        overlay_work: proto.overlay_work.clone(),
    })
}

fn network_mode_from_wire(v: i32) -> HopsResult<NetworkMode> {
    Ok(
        match generated::NetworkMode::try_from(v)
            .map_err(|_| HopsError::Configuration(format!("UnknownNetworkMode: {v}")))?
        {
            generated::NetworkMode::Disabled => NetworkMode::Disabled,
            generated::NetworkMode::Loopback => NetworkMode::Loopback,
            generated::NetworkMode::Outbound => NetworkMode::Outbound,
            generated::NetworkMode::Full => NetworkMode::Full,
        },
    )
}

fn filesystem_right_from_wire(v: i32) -> HopsResult<FilesystemRight> {
    Ok(
        match generated::FilesystemRight::try_from(v)
            .map_err(|_| HopsError::Configuration(format!("UnknownFilesystemRight: {v}")))?
        {
            generated::FilesystemRight::Read => FilesystemRight::Read,
            generated::FilesystemRight::Write => FilesystemRight::Write,
            generated::FilesystemRight::Execute => FilesystemRight::Execute,
        },
    )
}

fn mount_type_from_wire(v: i32) -> HopsResult<MountType> {
    Ok(
        match generated::MountType::try_from(v)
            .map_err(|_| HopsError::Configuration(format!("UnknownMountType: {v}")))?
        {
            generated::MountType::Bind => MountType::Bind,
            generated::MountType::Tmpfs => MountType::Tmpfs,
            generated::MountType::Overlay => MountType::Overlay,
            generated::MountType::Proc => MountType::Proc,
            generated::MountType::Sysfs => MountType::Sysfs,
            generated::MountType::Devtmpfs => MountType::Devtmpfs,
        },
    )
}

fn mount_mode_from_wire(v: i32) -> HopsResult<MountMode> {
    Ok(
        match generated::MountMode::try_from(v)
            .map_err(|_| HopsError::Configuration(format!("UnknownMountMode: {v}")))?
        {
            generated::MountMode::ReadOnly => MountMode::ReadOnly,
            generated::MountMode::ReadWrite => MountMode::ReadWrite,
        },
    )
}

pub fn summary_to_wire(summary: &ContainerSummary) -> generated::SandboxSummary {
    generated::SandboxSummary {
        container_id: summary.container_id.clone(),
        policy_name: summary.policy_name.clone(),
        command_args: summary.command_args.clone(),
        generated_guest_pid: summary.generated_guest_pid,
        state: state_to_wire(summary.state) as i32,
        started_at_millis: system_time_to_millis(summary.started_at),
    }
}

fn state_to_wire(state: ContainerState) -> generated::SandboxState {
    match state {
        ContainerState::Running => generated::SandboxState::Running,
        ContainerState::Stopped => generated::SandboxState::Stopped,
    }
}

pub fn system_time_to_millis(time: SystemTime) -> i64 {
    time.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_inline() -> generated::InlinePolicy {
        generated::InlinePolicy {
            name: "dev".to_string(),
            version: String::new(),
            description: None,
            capability_grant: None,
            sandbox_config: None,
            metadata: Default::default(),
            rootfs_image: None,
        }
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let policy = policy_from_inline(&minimal_inline()).unwrap();
        assert_eq!(policy.name, "dev");
        assert_eq!(policy.version, default_version());
        assert_eq!(policy.capability_grant.network_mode, NetworkMode::Disabled);
        assert_eq!(policy.sandbox_config.root_path, PathBuf::new());
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let proto = generated::CapabilityGrant {
            network_mode: 99,
            filesystem_rights: vec![],
            allowed_paths: vec![],
            denied_paths: vec![],
            resource_limits: None,
        };
        assert!(capability_grant_from_wire(&proto).is_err());
    }
}

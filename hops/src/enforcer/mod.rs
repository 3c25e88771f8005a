//! Capability Enforcer (E): translates an accepted [`Policy`] plus a
//! concrete command into a [`GuestContainerConfiguration`]. Pure function,
//! no I/O beyond reading its inputs, no global state.

use std::path::Path;
use std::sync::Arc;

use hops_shared::constants::{network, INTERACTIVE_SHELLS};

use crate::policy::{FilesystemRight, MountMode, MountType, NetworkMode, Policy};
use crate::vmm::io::{OutputSink, StdinSource};
use crate::vmm::types::{GuestContainerConfiguration, GuestMount, GuestMountType, NatInterface};

/// Guest mountpoint the host-side sandbox root (`sandbox.rootPath`) is
/// bind-shared at, when it names a real override rather than the `/`
/// sentinel meaning "no dedicated sandbox root".
const SANDBOX_ROOT_MOUNT_DESTINATION: &str = "/sandbox";

/// Guest I/O wiring requested for one container. Grouped into its own
/// struct so `configure`'s signature stays readable as the sink/source set
/// grows.
#[derive(Default)]
pub struct GuestIo {
    pub stdout_sink: Option<Arc<dyn OutputSink>>,
    pub stderr_sink: Option<Arc<dyn OutputSink>>,
    pub stdin_source: Option<Arc<dyn StdinSource>>,
}

pub fn configure(
    policy: &Policy,
    command: &[String],
    io: GuestIo,
    allocate_tty: bool,
) -> GuestContainerConfiguration {
    let hostname = policy
        .sandbox_config
        .hostname
        .clone()
        .unwrap_or_else(|| policy.name.clone());

    let mut process_arguments = if command.is_empty() {
        vec!["/bin/sh".to_string()]
    } else {
        command.to_vec()
    };

    let working_directory = policy.sandbox_config.working_directory.clone();

    let mut environment = policy.sandbox_config.environment.clone();
    if allocate_tty {
        inject_if_absent(&mut environment, "TERM", "xterm-256color");
        inject_if_absent(&mut environment, "PS1", r"[\u@\h \W]\$ ");
    }

    if allocate_tty {
        apply_shell_interactive_detection(&mut process_arguments);
    }

    let grant = &policy.capability_grant;
    let cpu_count = grant.resource_limits.cpu_count;
    let memory_bytes = grant.resource_limits.memory_bytes;

    let nat_interface = match grant.network_mode {
        NetworkMode::Disabled | NetworkMode::Loopback => None,
        NetworkMode::Outbound | NetworkMode::Full => {
            inject_dns_if_shell_script(&mut process_arguments);
            Some(NatInterface {
                address_cidr: network::NAT_GUEST_ADDRESS.to_string(),
                gateway: network::NAT_GATEWAY.to_string(),
            })
        }
    };

    let mut mounts = Vec::new();
    let mut mount_destinations = std::collections::BTreeSet::new();
    for entry in &policy.sandbox_config.mounts {
        let destination = Path::new(&entry.destination).to_path_buf();
        if grant.denied_paths.contains(&destination) {
            tracing::warn!(
                destination = %destination.display(),
                "skipping mount: destination is in deniedPaths"
            );
            continue;
        }
        mount_destinations.insert(destination.clone());
        mounts.push(GuestMount {
            source: (!entry.source.is_empty()).then(|| Path::new(&entry.source).to_path_buf()),
            destination,
            kind: translate_mount_type(entry.kind),
            writable: matches!(entry.mode, MountMode::ReadWrite),
        });
    }

    for path in &grant.allowed_paths {
        if mount_destinations.contains(path) {
            continue;
        }
        mounts.push(GuestMount {
            source: Some(path.clone()),
            destination: path.clone(),
            kind: GuestMountType::Bind,
            writable: grant.filesystem_rights.contains(&FilesystemRight::Write),
        });
    }

    let root_path = &policy.sandbox_config.root_path;
    let sandbox_root_destination = Path::new(SANDBOX_ROOT_MOUNT_DESTINATION).to_path_buf();
    if root_path.as_os_str() != "/" && !mount_destinations.contains(&sandbox_root_destination) {
        mounts.push(GuestMount {
            source: Some(root_path.clone()),
            destination: sandbox_root_destination,
            kind: GuestMountType::Bind,
            writable: true,
        });
    }

    GuestContainerConfiguration {
        hostname,
        process_arguments,
        working_directory,
        environment,
        cpu_count,
        memory_bytes,
        nat_interface,
        mounts,
        stdout_sink: io.stdout_sink,
        stderr_sink: io.stderr_sink,
        stdin_source: io.stdin_source,
    }
}

fn inject_if_absent(environment: &mut Vec<(String, String)>, key: &str, value: &str) {
    if environment.iter().any(|(k, _)| k == key) {
        return;
    }
    environment.push((key.to_string(), value.to_string()));
}

/// When `allocateTty` is set and `argv[0]`'s basename is a known shell with
/// no short option already present as the second argument, insert `-i`.
fn apply_shell_interactive_detection(process_arguments: &mut Vec<String>) {
    let Some(first) = process_arguments.first() else {
        return;
    };
    let basename = Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(first);
    if !INTERACTIVE_SHELLS.contains(&basename) {
        return;
    }
    if let Some(second) = process_arguments.get(1) {
        if second.starts_with('-') {
            return;
        }
    }
    process_arguments.insert(1, "-i".to_string());
}

/// When the command is exactly `/bin/sh -c <script>` and outbound
/// networking is active, prefix the script with lines that write
/// nameservers to `/etc/resolv.conf` before the user's script runs. Never
/// injected through a channel that touches the rootfs image before boot.
fn inject_dns_if_shell_script(process_arguments: &mut [String]) {
    if process_arguments.len() != 3 {
        return;
    }
    if process_arguments[0] != "/bin/sh" || process_arguments[1] != "-c" {
        return;
    }
    let prefix: String = network::DNS_SERVERS
        .iter()
        .map(|ns| format!("echo nameserver {ns} >> /etc/resolv.conf; "))
        .collect();
    process_arguments[2] = format!("{prefix}{}", process_arguments[2]);
}

fn translate_mount_type(kind: MountType) -> GuestMountType {
    match kind {
        MountType::Bind | MountType::Overlay => GuestMountType::Bind,
        MountType::Tmpfs => GuestMountType::Tmpfs,
        MountType::Proc => GuestMountType::Proc,
        MountType::Sysfs => GuestMountType::Sysfs,
        MountType::Devtmpfs => GuestMountType::Devtmpfs,
    }
}

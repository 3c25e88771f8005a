//! Value types passed from the Capability Enforcer (E) to the VM manager.
//! None of these types perform I/O or own a running resource; constructing
//! one never starts a container.

use super::io::{OutputSink, StdinSource};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GuestMountType {
    Bind,
    Tmpfs,
    Proc,
    Sysfs,
    Devtmpfs,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GuestMount {
    pub source: Option<PathBuf>,
    pub destination: PathBuf,
    pub kind: GuestMountType,
    pub writable: bool,
}

/// A single NAT interface, attached at `192.168.65.5/24` with gateway
/// `192.168.65.1` when network mode is Outbound or Full.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct NatInterface {
    pub address_cidr: String,
    pub gateway: String,
}

/// The value `configure()` produces: everything the VM manager needs to
/// create and start one guest container. Never constructed with side
/// effects and never itself starts anything. Cheaply `Clone` (sinks/source
/// are reference-counted handles, not owned resources).
#[derive(Clone)]
pub struct GuestContainerConfiguration {
    pub hostname: String,
    pub process_arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: Vec<(String, String)>,
    pub cpu_count: Option<u32>,
    pub memory_bytes: Option<u64>,
    pub nat_interface: Option<NatInterface>,
    pub mounts: Vec<GuestMount>,
    pub stdout_sink: Option<Arc<dyn OutputSink>>,
    pub stderr_sink: Option<Arc<dyn OutputSink>>,
    pub stdin_source: Option<Arc<dyn StdinSource>>,
}

impl GuestContainerConfiguration {
    /// Project the configuration into the plain-data form handed across
    /// the process boundary to `hops-vmshim` (the sinks/sources live in
    /// this process; the subprocess only needs to know where to bridge
    /// the guest's control channel).
    pub fn to_boot_spec(
        &self,
        rootfs_disk_path: std::path::PathBuf,
        kernel_path: std::path::PathBuf,
        guest_socket_path: std::path::PathBuf,
        init_filesystem_path: std::path::PathBuf,
        nat_endpoint_path: Option<std::path::PathBuf>,
    ) -> VmBootSpec {
        VmBootSpec {
            hostname: self.hostname.clone(),
            process_arguments: self.process_arguments.clone(),
            working_directory: self.working_directory.clone(),
            environment: self.environment.clone(),
            cpu_count: self.cpu_count.unwrap_or(1).clamp(1, 16),
            memory_mib: self
                .memory_bytes
                .map(|b| (b / (1024 * 1024)).clamp(128, 8 * 1024) as u32)
                .unwrap_or(512),
            nat_interface: self.nat_interface.clone(),
            nat_endpoint_path,
            mounts: self.mounts.clone(),
            rootfs_disk_path,
            kernel_path,
            guest_socket_path,
            init_filesystem_path,
        }
    }
}

/// Plain-data projection of [`GuestContainerConfiguration`], serialized
/// and handed to the `hops-vmshim` subprocess as its `--config` argument.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct VmBootSpec {
    pub hostname: String,
    pub process_arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: Vec<(String, String)>,
    pub cpu_count: u32,
    pub memory_mib: u32,
    pub nat_interface: Option<NatInterface>,
    /// Host-side unix datagram socket a `gvproxy` instance is already
    /// listening on, bridging `nat_interface`'s NAT/DHCP to the guest.
    /// `None` whenever `nat_interface` is `None`.
    pub nat_endpoint_path: Option<PathBuf>,
    pub mounts: Vec<GuestMount>,
    pub rootfs_disk_path: PathBuf,
    pub kernel_path: PathBuf,
    pub guest_socket_path: PathBuf,
    pub init_filesystem_path: PathBuf,
}

impl std::fmt::Debug for GuestContainerConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestContainerConfiguration")
            .field("hostname", &self.hostname)
            .field("process_arguments", &self.process_arguments)
            .field("working_directory", &self.working_directory)
            .field("environment", &self.environment)
            .field("cpu_count", &self.cpu_count)
            .field("memory_bytes", &self.memory_bytes)
            .field("nat_interface", &self.nat_interface)
            .field("mounts", &self.mounts)
            .field("stdout_sink", &self.stdout_sink.is_some())
            .field("stderr_sink", &self.stderr_sink.is_some())
            .field("stdin_source", &self.stdin_source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> GuestContainerConfiguration {
        GuestContainerConfiguration {
            hostname: "demo".to_string(),
            process_arguments: vec!["/bin/sh".to_string()],
            working_directory: None,
            environment: vec![],
            cpu_count: None,
            memory_bytes: None,
            nat_interface: None,
            mounts: vec![],
            stdout_sink: None,
            stderr_sink: None,
            stdin_source: None,
        }
    }

    #[test]
    fn to_boot_spec_carries_mounts_and_nat_interface_through() {
        let mut config = base_config();
        config.mounts.push(GuestMount {
            source: Some(PathBuf::from("/host/data")),
            destination: PathBuf::from("/data"),
            kind: GuestMountType::Bind,
            writable: true,
        });
        config.nat_interface = Some(NatInterface {
            address_cidr: "192.168.65.5/24".to_string(),
            gateway: "192.168.65.1".to_string(),
        });

        let spec = config.to_boot_spec(
            PathBuf::from("/state/containers/c1/rootfs.ext4"),
            PathBuf::from("/state/vmlinux"),
            PathBuf::from("/state/containers/c1/guest.sock"),
            PathBuf::from("/state/initfs"),
            Some(PathBuf::from("/state/containers/c1/net.sock")),
        );

        assert_eq!(spec.mounts.len(), 1);
        assert_eq!(spec.mounts[0].destination, PathBuf::from("/data"));
        assert!(spec.mounts[0].writable);
        let nat = spec.nat_interface.expect("nat interface projected");
        assert_eq!(nat.address_cidr, "192.168.65.5/24");
        assert_eq!(
            spec.nat_endpoint_path,
            Some(PathBuf::from("/state/containers/c1/net.sock"))
        );
    }

    #[test]
    fn to_boot_spec_omits_nat_endpoint_when_no_interface_requested() {
        let config = base_config();
        let spec = config.to_boot_spec(
            PathBuf::from("/state/containers/c1/rootfs.ext4"),
            PathBuf::from("/state/vmlinux"),
            PathBuf::from("/state/containers/c1/guest.sock"),
            PathBuf::from("/state/initfs"),
            None,
        );
        assert!(spec.mounts.is_empty());
        assert!(spec.nat_interface.is_none());
        assert!(spec.nat_endpoint_path.is_none());
    }
}

//! Well-known filenames and values shared between the supervisor and the
//! sandbox manager.

/// Engine process-wide filesystem entries, all relative to the state directory.
pub mod files {
    pub const PID_FILE: &str = "hopsd.pid";
    pub const SOCKET_FILE: &str = "hops.sock";
    pub const LOCK_FILE: &str = "hopsd.lock";
    pub const KERNEL_IMAGE: &str = "vmlinux";
    pub const INIT_FILESYSTEM: &str = "initfs";
    pub const DEFAULT_ROOTFS: &str = "alpine-rootfs.ext4";
    pub const ENGINE_LOG: &str = "hopsd.log";
}

/// Directory names, all relative to the state directory.
pub mod dirs {
    pub const LOGS: &str = "logs";
    pub const PROFILES: &str = "profiles";
    pub const CONTAINERS: &str = "containers";
    pub const ROOTFS: &str = "rootfs";
    pub const OCI_CACHE: &str = "cache/oci";
}

/// Per-container entries, relative to `containers/<id>/`.
pub mod container_files {
    pub const ROOTFS_COPY: &str = "rootfs.ext4";
    pub const GUEST_SOCKET: &str = "guest.sock";
    /// Host-side unix datagram socket a per-container `gvproxy` instance
    /// listens on, bridging NAT/DHCP into the guest's virtio-net device.
    pub const NET_ENDPOINT: &str = "net.sock";
}

/// NAT networking constants. The source observed forwarding failures on
/// other ranges; treat the `/24` as configuration, not a hard constant,
/// but keep this as the default.
pub mod network {
    pub const NAT_GUEST_ADDRESS: &str = "192.168.65.5/24";
    pub const NAT_GATEWAY: &str = "192.168.65.1";
    pub const DNS_SERVERS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];
}

/// Virtiofs mount tag for the shared, read-only init filesystem attached
/// once to the VM manager at startup.
pub const INIT_FS_MOUNT_TAG: &str = "HopsInitFs";

/// Vsock port the guest's init agent listens on for the control-channel
/// framing. Bridged to a host-side unix socket per
/// container via `krun_add_vsock_port2`.
pub const GUEST_AGENT_VSOCK_PORT: u32 = 2677;

/// Shell names subject to interactive-mode (`-i`) argument injection.
pub const INTERACTIVE_SHELLS: [&str; 4] = ["sh", "bash", "zsh", "ash"];

/// `generatedGuestPid` lies in `[GUEST_PID_BASE, GUEST_PID_BASE + GUEST_PID_RANGE)`.
pub const GUEST_PID_BASE: u32 = 10_000;
pub const GUEST_PID_RANGE: u32 = 50_000;

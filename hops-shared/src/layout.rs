//! State-directory layout, computed in one place so the
//! supervisor (at startup) and the sandbox manager (during provisioning)
//! never disagree about a path.

use crate::constants::{container_files, dirs, files};
use std::path::{Path, PathBuf};

/// Resolved state-directory layout, rooted at `<HOME>/.hops/` unless
/// overridden.
#[derive(Clone, Debug)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the default layout under the user's home directory.
    pub fn resolve_default() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".hops")))
    }

    /// Resolve from an explicit override, falling back to the default.
    pub fn resolve(override_dir: Option<PathBuf>) -> Option<Self> {
        override_dir.map(Self::new).or_else(Self::resolve_default)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join(files::PID_FILE)
    }

    pub fn socket_file(&self) -> PathBuf {
        self.root.join(files::SOCKET_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(files::LOCK_FILE)
    }

    pub fn kernel_image(&self) -> PathBuf {
        self.root.join(files::KERNEL_IMAGE)
    }

    pub fn init_filesystem(&self) -> PathBuf {
        self.root.join(files::INIT_FILESYSTEM)
    }

    pub fn default_rootfs(&self) -> PathBuf {
        self.root.join(files::DEFAULT_ROOTFS)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(dirs::LOGS)
    }

    pub fn engine_log(&self) -> PathBuf {
        self.logs_dir().join(files::ENGINE_LOG)
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join(dirs::PROFILES)
    }

    pub fn profile_file(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(format!("{name}.toml"))
    }

    pub fn containers_dir(&self) -> PathBuf {
        self.root.join(dirs::CONTAINERS)
    }

    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.containers_dir().join(id)
    }

    pub fn container_rootfs_copy(&self, id: &str) -> PathBuf {
        self.container_dir(id).join(container_files::ROOTFS_COPY)
    }

    /// Host-side unix socket `krun_add_vsock_port2` listens on for this
    /// container's guest control channel.
    pub fn container_guest_socket(&self, id: &str) -> PathBuf {
        self.container_dir(id).join(container_files::GUEST_SOCKET)
    }

    /// Host-side unix datagram socket the container's `gvproxy` instance
    /// listens on, when its capability grant enables networking.
    pub fn container_net_endpoint(&self, id: &str) -> PathBuf {
        self.container_dir(id).join(container_files::NET_ENDPOINT)
    }

    pub fn named_rootfs_dir(&self) -> PathBuf {
        self.root.join(dirs::ROOTFS)
    }

    pub fn named_rootfs(&self, name: &str) -> PathBuf {
        self.named_rootfs_dir().join(format!("{name}.ext4"))
    }

    pub fn oci_cache_dir(&self) -> PathBuf {
        self.root.join(dirs::OCI_CACHE)
    }

    /// Create the full directory subtree. Does not create the pid/socket
    /// files themselves (the supervisor owns those).
    pub fn prepare(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.profiles_dir())?;
        std::fs::create_dir_all(self.containers_dir())?;
        std::fs::create_dir_all(self.named_rootfs_dir())?;
        std::fs::create_dir_all(self.oci_cache_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_paths_nest_under_containers_dir() {
        let layout = StateLayout::new("/test/.hops");
        assert_eq!(
            layout.container_dir("abc").to_str().unwrap(),
            "/test/.hops/containers/abc"
        );
        assert_eq!(
            layout.container_rootfs_copy("abc").to_str().unwrap(),
            "/test/.hops/containers/abc/rootfs.ext4"
        );
    }

    #[test]
    fn profile_file_appends_toml_extension() {
        let layout = StateLayout::new("/test/.hops");
        assert_eq!(
            layout.profile_file("dev").to_str().unwrap(),
            "/test/.hops/profiles/dev.toml"
        );
    }
}

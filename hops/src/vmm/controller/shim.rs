//! `VmmController`/`VmmHandler` pair that spawns one `hops-vmshim`
//! subprocess per guest container.

use std::ffi::CString;
use std::path::PathBuf;
use std::process::Child;
use std::time::{Duration, Instant};

use hops_shared::errors::{HopsError, HopsResult};
use hops_shared::layout::StateLayout;

use super::handler::{VmmHandler, VmmMetrics};
use super::spawn::spawn_subprocess;
use super::VmmController;
use crate::util;
use crate::vmm::types::GuestContainerConfiguration;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(20);
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// No port forwards: the NAT backend does outbound-only DHCP/NAT for the
/// guest, nothing host-exposed is forwarded in.
const EMPTY_PORT_MAP_JSON: &str = "[]";

pub struct ShimController {
    layout: StateLayout,
}

impl ShimController {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }
}

#[async_trait::async_trait]
impl VmmController for ShimController {
    async fn start(
        &mut self,
        container_id: &str,
        bundle: &GuestContainerConfiguration,
    ) -> HopsResult<Box<dyn VmmHandler>> {
        let binary_path = util::find_binary("hops-vmshim")?;
        let kernel_path = self.layout.kernel_image();
        let guest_socket_path = self.layout.container_guest_socket(container_id);
        if let Some(parent) = guest_socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Stale socket from a previous, unlinked run of this container id.
        let _ = std::fs::remove_file(&guest_socket_path);

        let (nat_endpoint_path, gvproxy_handle) = match &bundle.nat_interface {
            Some(nat) => {
                let endpoint_path = self.layout.container_net_endpoint(container_id);
                let _ = std::fs::remove_file(&endpoint_path);
                let handle = start_gvproxy(&endpoint_path, nat)?;
                (Some(endpoint_path), Some(handle))
            }
            None => (None, None),
        };

        let rootfs_disk_path = self.layout.container_rootfs_copy(container_id);
        let init_filesystem_path = self.layout.init_filesystem();
        let boot_spec = bundle.to_boot_spec(
            rootfs_disk_path,
            kernel_path.clone(),
            guest_socket_path.clone(),
            init_filesystem_path,
            nat_endpoint_path,
        );
        let config_json = serde_json::to_string(&boot_spec).map_err(|e| {
            HopsError::Internal(format!("failed to serialize VM boot spec: {e}"))
        })?;

        let child = match spawn_subprocess(&binary_path, container_id, &kernel_path, &config_json) {
            Ok(child) => child,
            Err(e) => {
                stop_gvproxy(gvproxy_handle);
                return Err(e);
            }
        };
        let pid = child.id();

        if let Err(e) = wait_for_guest_socket(&guest_socket_path, pid).await {
            stop_gvproxy(gvproxy_handle);
            return Err(e);
        }

        Ok(Box::new(ShimHandler {
            child,
            container_id: container_id.to_string(),
            guest_socket_path,
            gvproxy_handle,
        }))
    }
}

fn start_gvproxy(
    endpoint_path: &std::path::Path,
    nat: &crate::vmm::types::NatInterface,
) -> HopsResult<u64> {
    let endpoint_c = to_cstring(endpoint_path, "nat endpoint path")?;
    let cidr_c = CString::new(nat.address_cidr.as_str())
        .map_err(|e| HopsError::Internal(format!("invalid NAT CIDR: {e}")))?;
    let gateway_c = CString::new(nat.gateway.as_str())
        .map_err(|e| HopsError::Internal(format!("invalid NAT gateway: {e}")))?;
    let port_map_c = CString::new(EMPTY_PORT_MAP_JSON).expect("static string has no NUL bytes");

    let handle = unsafe {
        libgvproxy_sys::gvproxy_start(
            endpoint_c.as_ptr(),
            cidr_c.as_ptr(),
            gateway_c.as_ptr(),
            port_map_c.as_ptr(),
        )
    };
    if handle == 0 {
        return Err(HopsError::Runtime(
            "gvproxy_start failed to bring up the NAT network backend".to_string(),
        ));
    }
    Ok(handle)
}

fn stop_gvproxy(handle: Option<u64>) {
    if let Some(handle) = handle {
        let rc = unsafe { libgvproxy_sys::gvproxy_stop(handle) };
        if rc != 0 {
            tracing::warn!(rc, "gvproxy_stop returned a non-zero status");
        }
    }
}

fn to_cstring(path: &std::path::Path, label: &str) -> HopsResult<CString> {
    CString::new(path.to_string_lossy().as_bytes())
        .map_err(|e| HopsError::Internal(format!("invalid {label}: {e}")))
}

async fn wait_for_guest_socket(path: &PathBuf, pid: u32) -> HopsResult<()> {
    let deadline = Instant::now() + READY_TIMEOUT;
    loop {
        if path.exists() {
            return Ok(());
        }
        if !util::is_process_alive(pid) {
            return Err(HopsError::Runtime(format!(
                "hops-vmshim (pid {pid}) exited before its guest socket appeared"
            )));
        }
        if Instant::now() >= deadline {
            return Err(HopsError::Runtime(format!(
                "timed out waiting for hops-vmshim (pid {pid}) to bind its guest socket"
            )));
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

/// Runtime handle to a spawned `hops-vmshim` subprocess. `stop` kills the
/// subprocess directly; libkrun tears the guest down when its process
/// exits, there is no separate guest shutdown handshake.
pub struct ShimHandler {
    child: Child,
    container_id: String,
    guest_socket_path: PathBuf,
    gvproxy_handle: Option<u64>,
}

impl VmmHandler for ShimHandler {
    fn stop(&mut self) -> HopsResult<()> {
        let pid = self.child.id();
        if util::is_process_alive(pid) && util::is_same_process(pid, &self.container_id) {
            util::kill_process(pid);
        }
        let _ = self.child.wait();
        let _ = std::fs::remove_file(&self.guest_socket_path);
        stop_gvproxy(self.gvproxy_handle.take());
        Ok(())
    }

    fn metrics(&self) -> HopsResult<VmmMetrics> {
        // No cgroup/perf wiring in this process; `hops-vmshim` does not
        // currently report usage back over the control channel.
        Ok(VmmMetrics::default())
    }

    fn is_running(&self) -> bool {
        util::is_process_alive(self.child.id())
    }

    fn pid(&self) -> u32 {
        self.child.id()
    }
}

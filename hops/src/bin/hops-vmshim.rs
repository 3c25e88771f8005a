//! Subprocess entry point that owns one libkrun context for the lifetime
//! of one guest container.
//!
//! `krun_start_enter` takes over the calling thread once the guest boots
//! and never returns until the guest exits, which is why this lives in
//! its own binary rather than a thread inside `hopsd`.

use std::ffi::CString;
use std::path::PathBuf;

use clap::Parser;
use hops::vmm::types::{GuestMountType, VmBootSpec};
use hops_shared::constants::{GUEST_AGENT_VSOCK_PORT, INIT_FS_MOUNT_TAG};
use hops_shared::errors::HopsResult;
use libkrun_sys::{
    krun_add_disk2, krun_add_net_unixstream, krun_add_virtiofs, krun_add_vsock_port2,
    krun_create_ctx, krun_set_exec, krun_set_kernel, krun_set_vm_config, krun_set_workdir,
    krun_start_enter, KRUN_DISK_FORMAT_RAW,
};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long = "container-id")]
    container_id: String,

    #[arg(long = "kernel")]
    kernel: PathBuf,

    /// JSON-serialized `VmBootSpec`.
    #[arg(long = "config")]
    config: String,
}

fn to_cstring(s: &str) -> CString {
    CString::new(s).unwrap_or_else(|_| CString::new("").unwrap())
}

fn check(label: &str, rc: i32) -> HopsResult<i32> {
    if rc < 0 {
        Err(hops_shared::errors::HopsError::Runtime(format!(
            "{label} failed with libkrun error code {rc}"
        )))
    } else {
        Ok(rc)
    }
}

fn run(args: Args) -> HopsResult<()> {
    let spec: VmBootSpec = serde_json::from_str(&args.config).map_err(|e| {
        hops_shared::errors::HopsError::Configuration(format!(
            "failed to parse VM boot spec: {e}"
        ))
    })?;

    let ctx_id = check("krun_create_ctx", unsafe { krun_create_ctx() })? as u32;

    check(
        "krun_set_vm_config",
        unsafe { krun_set_vm_config(ctx_id, spec.cpu_count as u8, spec.memory_mib) },
    )?;

    let kernel_path = to_cstring(&spec.kernel_path.to_string_lossy());
    let cmdline = to_cstring("root=/dev/vda rw console=hvc0");
    check("krun_set_kernel", unsafe {
        krun_set_kernel(
            ctx_id,
            kernel_path.as_ptr(),
            0,
            std::ptr::null(),
            cmdline.as_ptr(),
        )
    })?;

    let disk_id = to_cstring("root");
    let disk_path = to_cstring(&spec.rootfs_disk_path.to_string_lossy());
    check("krun_add_disk2", unsafe {
        krun_add_disk2(
            ctx_id,
            disk_id.as_ptr(),
            disk_path.as_ptr(),
            KRUN_DISK_FORMAT_RAW,
            false,
        )
    })?;

    if spec.init_filesystem_path.exists() {
        let mount_tag = to_cstring(INIT_FS_MOUNT_TAG);
        let host_path = to_cstring(&spec.init_filesystem_path.to_string_lossy());
        check("krun_add_virtiofs", unsafe {
            krun_add_virtiofs(ctx_id, mount_tag.as_ptr(), host_path.as_ptr())
        })?;
    }

    // Tmpfs/Proc/Sysfs/Devtmpfs are mounted by the guest's own init agent;
    // only Bind mounts need a host-side virtiofs share set up here.
    for (i, mount) in spec.mounts.iter().enumerate() {
        if mount.kind != GuestMountType::Bind {
            continue;
        }
        let source = mount.source.as_ref().ok_or_else(|| {
            hops_shared::errors::HopsError::Configuration(format!(
                "bind mount at {} has no host source path",
                mount.destination.display()
            ))
        })?;
        let mount_tag = to_cstring(&format!("hopsmount{i}"));
        let host_path = to_cstring(&source.to_string_lossy());
        check("krun_add_virtiofs", unsafe {
            krun_add_virtiofs(ctx_id, mount_tag.as_ptr(), host_path.as_ptr())
        })?;
    }

    if let Some(endpoint_path) = &spec.nat_endpoint_path {
        let endpoint_c = to_cstring(&endpoint_path.to_string_lossy());
        check("krun_add_net_unixstream", unsafe {
            krun_add_net_unixstream(ctx_id, endpoint_c.as_ptr(), -1, std::ptr::null(), 0, 0)
        })?;
    }

    if let Some(workdir) = &spec.working_directory {
        let workdir_c = to_cstring(&workdir.to_string_lossy());
        check("krun_set_workdir", unsafe {
            krun_set_workdir(ctx_id, workdir_c.as_ptr())
        })?;
    }

    let argv_c: Vec<CString> = spec.process_arguments.iter().map(|a| to_cstring(a)).collect();
    let mut argv_ptrs: Vec<*const std::os::raw::c_char> =
        argv_c.iter().map(|a| a.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    let envp_c: Vec<CString> = spec
        .environment
        .iter()
        .map(|(k, v)| to_cstring(&format!("{k}={v}")))
        .collect();
    let mut envp_ptrs: Vec<*const std::os::raw::c_char> =
        envp_c.iter().map(|e| e.as_ptr()).collect();
    envp_ptrs.push(std::ptr::null());

    let exec_path = to_cstring(
        spec.process_arguments
            .first()
            .map(String::as_str)
            .unwrap_or("/bin/sh"),
    );
    check("krun_set_exec", unsafe {
        krun_set_exec(
            ctx_id,
            exec_path.as_ptr(),
            argv_ptrs.as_ptr(),
            envp_ptrs.as_ptr(),
        )
    })?;

    let socket_path = to_cstring(&spec.guest_socket_path.to_string_lossy());
    check("krun_add_vsock_port2", unsafe {
        krun_add_vsock_port2(ctx_id, GUEST_AGENT_VSOCK_PORT, socket_path.as_ptr(), true)
    })?;

    tracing::info!(
        container_id = %args.container_id,
        hostname = %spec.hostname,
        "entering guest"
    );

    // Never returns on success; the guest runs for the life of this process.
    check("krun_start_enter", unsafe { krun_start_enter(ctx_id) })?;
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

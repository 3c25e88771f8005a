//! Process validation utilities for PID checking and verification.

/// Kill a process with SIGKILL.
///
/// # Returns
/// * `true` - Process was killed or doesn't exist
/// * `false` - Failed to kill (permission denied)
pub fn kill_process(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, libc::SIGKILL) == 0 || !is_process_alive(pid) }
}

/// Check if a process with the given PID exists.
///
/// Uses `libc::kill(pid, 0)` which sends a null signal to check existence.
///
/// # Returns
/// * `true` - Process exists
/// * `false` - Process does not exist or permission denied
pub fn is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Verify that a PID belongs to the `hops-vmshim` process for the given
/// container.
///
/// This prevents PID reuse attacks where a PID is recycled for a different
/// process between the time a container's shim PID was recorded and the
/// time it's checked again.
///
/// # Implementation
/// * **Linux**: Read `/proc/{pid}/cmdline` and check for "hops-vmshim" + container_id
/// * **macOS**: Use `sysinfo` crate to get process name and check for "hops-vmshim"
pub fn is_same_process(pid: u32, container_id: &str) -> bool {
    #[cfg(target_os = "linux")]
    {
        is_same_process_linux(pid, container_id)
    }

    #[cfg(target_os = "macos")]
    {
        let _ = container_id; // Unused on macOS
        is_same_process_macos(pid)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        is_process_alive(pid)
    }
}

#[cfg(target_os = "linux")]
fn is_same_process_linux(pid: u32, container_id: &str) -> bool {
    use std::fs;

    let cmdline_path = format!("/proc/{}/cmdline", pid);

    match fs::read_to_string(&cmdline_path) {
        Ok(cmdline) => {
            let args: Vec<&str> = cmdline.split('\0').collect();
            args.iter().any(|arg| arg.contains("hops-vmshim")) && cmdline.contains(container_id)
        }
        Err(_) => false,
    }
}

#[cfg(target_os = "macos")]
fn is_same_process_macos(pid: u32) -> bool {
    use sysinfo::{Pid, System};

    let mut sys = System::new();
    let pid_obj = Pid::from_u32(pid);

    sys.refresh_process(pid_obj);

    if let Some(process) = sys.process(pid_obj) {
        process.name().contains("hops-vmshim")
    } else {
        false
    }
}

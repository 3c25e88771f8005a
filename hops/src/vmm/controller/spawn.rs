//! Subprocess spawning for the `hops-vmshim` binary.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use hops_shared::errors::{HopsError, HopsResult};

/// Spawns `hops-vmshim` with a JSON-serialized `GuestContainerConfiguration`
/// passed as a single argument, and null stdio (the shim logs to the
/// engine's own log sink over its own channel, not inherited fds).
pub(crate) fn spawn_subprocess(
    binary_path: &PathBuf,
    container_id: &str,
    kernel_path: &PathBuf,
    config_json: &str,
) -> HopsResult<Child> {
    let mut cmd = Command::new(binary_path);
    cmd.arg("--container-id")
        .arg(container_id)
        .arg("--kernel")
        .arg(kernel_path)
        .arg("--config")
        .arg(config_json);

    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        cmd.env("RUST_LOG", rust_log);
    }
    configure_library_env(&mut cmd);

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    cmd.spawn().map_err(|e| {
        let message = format!(
            "failed to spawn VM subprocess at {}: {e}",
            binary_path.display()
        );
        tracing::error!("{message}");
        HopsError::Runtime(message)
    })
}

/// Propagate the host's native-library search path to the subprocess, so a
/// non-system-installed libkrun/libgvproxy bundled alongside the engine
/// binary is still found.
fn configure_library_env(cmd: &mut Command) {
    #[cfg(target_os = "linux")]
    const VAR: &str = "LD_LIBRARY_PATH";
    #[cfg(target_os = "macos")]
    const VAR: &str = "DYLD_LIBRARY_PATH";

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    if let Ok(path) = std::env::var(VAR) {
        cmd.env(VAR, path);
    }
}

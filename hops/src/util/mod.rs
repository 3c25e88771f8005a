//! Small host-facing helpers shared across the engine.

mod process;

pub use process::{is_process_alive, is_same_process, kill_process};

use std::path::PathBuf;

use hops_shared::errors::{HopsError, HopsResult};

/// Locate a companion binary (e.g. `hops-vmshim`) installed alongside the
/// currently running executable, falling back to `$PATH`.
pub fn find_binary(name: &str) -> HopsResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(HopsError::Environment(format!(
        "companion binary `{name}` not found next to the current executable or on PATH"
    )))
}

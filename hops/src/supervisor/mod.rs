//! Engine Supervisor (D): state-directory preparation, pid/lock/socket file
//! lifecycle, and the signal-driven graceful shutdown sequence.

mod lock;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;

use hops_shared::errors::{HopsError, HopsResult};
use hops_shared::generated::control_server::ControlServer;
use hops_shared::layout::StateLayout;

use crate::control::ControlService;
use crate::sandbox::SandboxManager;

pub use lock::EngineLock;

/// Recommended drain window between rejecting new `RunSandbox*` calls and
/// force-stopping whatever is still running.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Owns the state directory for the lifetime of one engine process: the
/// advisory lock file, the pid file, and (via [`serve`]) the control
/// socket. Dropping it removes the pid file; the lock is released by its
/// own guard.
pub struct EngineSupervisor {
    layout: StateLayout,
    _lock: EngineLock,
}

impl EngineSupervisor {
    /// Prepare the full state-directory layout, acquire the single-writer
    /// lock, and record this process's pid. Fails if another supervisor
    /// already holds the lock on this directory.
    pub fn start(layout: StateLayout) -> HopsResult<Self> {
        layout.prepare()?;
        set_permissions(layout.root(), 0o700)?;

        let lock = EngineLock::acquire(&layout.lock_file())?;
        write_pid_file(&layout.pid_file())?;

        Ok(Self {
            layout,
            _lock: lock,
        })
    }

    /// Bind the control socket and serve the `Control` RPC surface until a
    /// termination signal arrives, then run the graceful-shutdown sequence:
    /// reject new calls, drain active sandboxes (bounded by
    /// [`SHUTDOWN_GRACE`]), force-stop whatever remains.
    pub async fn serve(self, manager: Arc<SandboxManager>, control: ControlService) -> HopsResult<()> {
        let socket_path = self.layout.socket_file();
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path).map_err(|e| {
            HopsError::Environment(format!(
                "failed to bind control socket at {}: {e}",
                socket_path.display()
            ))
        })?;
        set_permissions(&socket_path, 0o600)?;

        let accepting = control.shutdown_flag();
        let incoming = UnixListenerStream::new(listener);

        tracing::info!(socket = %socket_path.display(), "control service listening");

        let shutdown = async move {
            wait_for_termination_signal().await;
            tracing::info!("termination signal received, entering graceful shutdown");
            accepting.store(false, Ordering::SeqCst);
            drain_with_grace(&manager, SHUTDOWN_GRACE).await;
        };

        tonic::transport::Server::builder()
            .add_service(ControlServer::new(control))
            .serve_with_incoming_shutdown(incoming, shutdown)
            .await
            .map_err(|e| HopsError::Runtime(format!("control service failed: {e}")))?;

        let _ = std::fs::remove_file(&socket_path);
        Ok(())
    }
}

impl Drop for EngineSupervisor {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(self.layout.pid_file());
    }
}

async fn wait_for_termination_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

/// Wait for active sandboxes to finish on their own, up to `grace`; force
/// stop whatever is still running afterward.
async fn drain_with_grace(manager: &SandboxManager, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    while manager.active_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }

    if manager.active_count() == 0 {
        return;
    }

    let remaining = manager.list().await;
    tracing::warn!(
        count = remaining.len(),
        "grace period elapsed, force-stopping remaining sandboxes"
    );
    for summary in remaining {
        if let Err(e) = manager.stop(&summary.container_id).await {
            tracing::warn!(
                container_id = %summary.container_id,
                error = %e,
                "failed to force-stop sandbox during shutdown"
            );
        }
    }
}

fn write_pid_file(path: &Path) -> HopsResult<()> {
    let pid = std::process::id();
    std::fs::write(path, format!("{pid}\n"))
        .map_err(|e| HopsError::Environment(format!("failed to write pid file: {e}")))?;
    set_permissions(path, 0o600)
}

fn set_permissions(path: &Path, mode: u32) -> HopsResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        HopsError::Environment(format!(
            "failed to set permissions on {}: {e}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_creates_full_layout_and_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(dir.path().join(".hops"));
        let supervisor = EngineSupervisor::start(layout.clone()).unwrap();

        assert!(layout.containers_dir().is_dir());
        assert!(layout.pid_file().is_file());
        let pid_text = std::fs::read_to_string(layout.pid_file()).unwrap();
        assert_eq!(pid_text.trim().parse::<u32>().unwrap(), std::process::id());

        drop(supervisor);
        assert!(!layout.pid_file().exists());
    }

    #[test]
    fn second_start_on_same_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(dir.path().join(".hops"));
        let _first = EngineSupervisor::start(layout.clone()).unwrap();
        let second = EngineSupervisor::start(layout);
        assert!(second.is_err());
    }
}

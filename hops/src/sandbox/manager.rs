//! Sandbox Manager (S): owns the container table, the VM manager handle,
//! and the per-container pipelines that create, run, and tear down guest
//! containers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use hops_shared::errors::{HopsError, HopsResult};
use hops_shared::layout::StateLayout;

use crate::enforcer::GuestIo;
use crate::pipeline::{ExecutionPlan, PipelineBuilder, PipelineExecutor, Stage};
use crate::policy::Policy;
use crate::sandbox::guest_bridge;
use crate::sandbox::handler_table::HandlerTable;
use crate::sandbox::stdin_injector::StdinInjector;
use crate::sandbox::table::{ContainerRecord, ContainerState, ContainerTable};
use crate::sandbox::tasks::{
    ConfigureGuestTask, CreateContainerDirTask, ProvisionCtx, ProvisionRootfsTask,
    SpawnContainerTask,
};
use crate::vmm::VmmController;

/// Projection of a [`ContainerRecord`] returned by `list`/`status`.
#[derive(Clone, Debug)]
pub struct ContainerSummary {
    pub container_id: String,
    pub policy_name: String,
    pub command_args: Vec<String>,
    pub generated_guest_pid: u32,
    pub state: ContainerState,
    pub started_at: std::time::SystemTime,
}

impl From<&ContainerRecord> for ContainerSummary {
    fn from(record: &ContainerRecord) -> Self {
        Self {
            container_id: record.container_id.clone(),
            policy_name: record.policy_name.clone(),
            command_args: record.command_args.clone(),
            generated_guest_pid: record.generated_guest_pid,
            state: record.state(),
            started_at: record.started_at,
        }
    }
}

/// Best-effort resource counters for a running container.
#[derive(Clone, Debug, Default)]
pub struct ContainerStatistics {
    pub cpu_nanoseconds: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub network_rx_bytes: Option<u64>,
    pub network_tx_bytes: Option<u64>,
}

/// Inputs for one `run`/`runStreaming` call. The stdin injector (if any)
/// is constructed by the manager itself, not the caller, so the handle
/// returned in [`RunHandle`] is guaranteed to be the same object wired
/// into the guest I/O bridge.
pub struct RunRequest {
    pub container_id: String,
    pub policy: Policy,
    pub command: Vec<String>,
    pub keep_artifacts: bool,
    pub allocate_tty: bool,
    pub stdout_sink: Option<Arc<dyn crate::vmm::io::OutputSink>>,
    pub stderr_sink: Option<Arc<dyn crate::vmm::io::OutputSink>>,
    pub bind_stdin: bool,
}

/// What the caller gets back immediately after a container starts: a
/// handle to feed stdin (if a tty was requested) and a future that
/// resolves to the exit code once the guest finishes.
pub struct RunHandle {
    pub stdin_injector: Option<Arc<StdinInjector>>,
    pub exit_code: tokio::sync::oneshot::Receiver<i32>,
}

pub struct SandboxManager {
    layout: StateLayout,
    table: ContainerTable,
    handler_table: HandlerTable,
    vmm_controller: Arc<Mutex<Box<dyn VmmController>>>,
    active_count: Arc<AtomicUsize>,
}

impl SandboxManager {
    /// Initialization: verify the kernel/initfs images exist, then sweep
    /// every directory under `containers/` left over from a previous run.
    pub async fn new(
        layout: StateLayout,
        controller: Box<dyn VmmController>,
    ) -> HopsResult<Self> {
        if !layout.kernel_image().exists() {
            return Err(HopsError::Environment(format!(
                "MissingKernel: {}",
                layout.kernel_image().display()
            )));
        }
        if !layout.init_filesystem().exists() {
            return Err(HopsError::Environment(format!(
                "MissingInitfs: {}",
                layout.init_filesystem().display()
            )));
        }

        sweep_stale_containers(&layout)?;

        Ok(Self {
            layout,
            table: ContainerTable::new(),
            handler_table: HandlerTable::new(),
            vmm_controller: Arc::new(Mutex::new(controller)),
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    pub async fn run_streaming(&self, request: RunRequest) -> HopsResult<RunHandle> {
        if self.table.contains(&request.container_id).await {
            return Err(HopsError::State(format!(
                "DuplicateContainerId: {} already in containerTable",
                request.container_id
            )));
        }

        let stdin_injector = request.bind_stdin.then(|| Arc::new(StdinInjector::new()));
        let guest_io = GuestIo {
            stdout_sink: request.stdout_sink,
            stderr_sink: request.stderr_sink,
            stdin_source: stdin_injector
                .clone()
                .map(|injector| injector as Arc<dyn crate::vmm::io::StdinSource>),
        };

        let ctx = ProvisionCtx {
            container_id: request.container_id.clone(),
            layout: self.layout.clone(),
            policy: Arc::new(request.policy),
            command: Arc::new(request.command),
            allocate_tty: request.allocate_tty,
            keep_artifacts: request.keep_artifacts,
            guest_io: Arc::new(Mutex::new(Some(guest_io))),
            rootfs_disk_path: Arc::new(Mutex::new(None)),
            guest_config: Arc::new(Mutex::new(None)),
            vmm_controller: self.vmm_controller.clone(),
            handler_table: self.handler_table.clone(),
            table: self.table.clone(),
        };

        let plan = ExecutionPlan::new(vec![
            Stage::sequential(vec![Box::new(CreateContainerDirTask)]),
            Stage::sequential(vec![Box::new(ProvisionRootfsTask)]),
            Stage::sequential(vec![Box::new(ConfigureGuestTask)]),
            Stage::sequential(vec![Box::new(SpawnContainerTask)]),
        ]);
        let pipeline = PipelineBuilder::from_plan(plan);
        if let Err(e) = PipelineExecutor::execute(pipeline, ctx.clone()).await {
            let container_dir = self.layout.container_dir(&request.container_id);
            if let Err(cleanup_err) = std::fs::remove_dir_all(&container_dir) {
                if cleanup_err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        container_id = %request.container_id,
                        error = %cleanup_err,
                        "failed to remove container directory after provisioning failure"
                    );
                }
            }
            return Err(e);
        }

        self.active_count.fetch_add(1, Ordering::SeqCst);

        let guest_socket_path = self.layout.container_guest_socket(&request.container_id);
        let stdout_sink = ctx_stdout_sink(&ctx).await;
        let stderr_sink = ctx_stderr_sink(&ctx).await;
        let stdin_source = ctx_stdin_source(&ctx).await;

        let (exit_tx, exit_rx) = tokio::sync::oneshot::channel();
        let table = self.table.clone();
        let handler_table = self.handler_table.clone();
        let active_count = self.active_count.clone();
        let container_id = request.container_id.clone();
        let keep_artifacts = request.keep_artifacts;
        let container_dir = self.layout.container_dir(&request.container_id);

        tokio::spawn(async move {
            let exit_code =
                guest_bridge::run(&guest_socket_path, stdout_sink, stderr_sink, stdin_source)
                    .await;
            run_exit_handler(
                &table,
                &handler_table,
                &container_id,
                keep_artifacts,
                &container_dir,
            )
            .await;
            active_count.fetch_sub(1, Ordering::SeqCst);
            let _ = exit_tx.send(exit_code);
        });

        Ok(RunHandle {
            stdin_injector,
            exit_code: exit_rx,
        })
    }

    /// Identical to `run_streaming` except no sinks/stdin are bound; the
    /// caller gets a handle but typically discards it.
    pub async fn run(&self, mut request: RunRequest) -> HopsResult<RunHandle> {
        request.stdout_sink = None;
        request.stderr_sink = None;
        request.bind_stdin = false;
        self.run_streaming(request).await
    }

    /// Client-initiated stop: requests termination and marks the record
    /// finished with no exit code (signalled termination). The background
    /// waiter spawned in `run_streaming` observes the resulting guest exit
    /// and runs the normal exit handler, which removes the table entry.
    pub async fn stop(&self, container_id: &str) -> HopsResult<()> {
        if !self.table.contains(container_id).await {
            return Err(HopsError::State(format!("NotFound: {container_id}")));
        }

        self.handler_table.stop(container_id).await;
        self.table.mark_finished(container_id, None).await;
        Ok(())
    }

    pub async fn list(&self) -> Vec<ContainerSummary> {
        self.table.list().await.iter().map(ContainerSummary::from).collect()
    }

    pub async fn status(&self, container_id: &str) -> HopsResult<ContainerSummary> {
        self.table
            .get(container_id)
            .await
            .map(|record| ContainerSummary::from(&record))
            .ok_or_else(|| HopsError::State(format!("NotFound: {container_id}")))
    }

    pub async fn statistics(&self, container_id: &str) -> HopsResult<ContainerStatistics> {
        if !self.table.contains(container_id).await {
            return Err(HopsError::State(format!("NotFound: {container_id}")));
        }
        // Best-effort: `hops-vmshim` does not currently report live usage
        // back over the control channel.
        Ok(ContainerStatistics::default())
    }
}

async fn ctx_stdout_sink(
    ctx: &ProvisionCtx,
) -> Option<Arc<dyn crate::vmm::io::OutputSink>> {
    ctx.guest_config
        .lock()
        .await
        .as_ref()
        .and_then(|c| c.stdout_sink.clone())
}

async fn ctx_stderr_sink(
    ctx: &ProvisionCtx,
) -> Option<Arc<dyn crate::vmm::io::OutputSink>> {
    ctx.guest_config
        .lock()
        .await
        .as_ref()
        .and_then(|c| c.stderr_sink.clone())
}

async fn ctx_stdin_source(
    ctx: &ProvisionCtx,
) -> Option<Arc<dyn crate::vmm::io::StdinSource>> {
    ctx.guest_config
        .lock()
        .await
        .as_ref()
        .and_then(|c| c.stdin_source.clone())
}

fn sweep_stale_containers(layout: &StateLayout) -> HopsResult<()> {
    let containers_dir = layout.containers_dir();
    if !containers_dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(&containers_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        }
    }
    Ok(())
}

async fn run_exit_handler(
    table: &ContainerTable,
    handler_table: &HandlerTable,
    container_id: &str,
    keep_artifacts: bool,
    container_dir: &PathBuf,
) {
    table.remove(container_id).await;
    handler_table.stop(container_id).await;
    if !keep_artifacts {
        if let Err(e) = std::fs::remove_dir_all(container_dir) {
            tracing::warn!(
                container_id,
                error = %e,
                "failed to remove container directory during cleanup"
            );
        }
    }
    tracing::info!(container_id, "container exited, table entry and artifacts cleaned up");
}

//! The four pipeline tasks that make up one `runStreaming`/`run` call.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use hops_shared::errors::{HopsError, HopsResult};
use hops_shared::layout::StateLayout;

use crate::enforcer::{self, GuestIo};
use crate::pipeline::PipelineTask;
use crate::policy::{validator, Policy};
use crate::sandbox::handler_table::HandlerTable;
use crate::sandbox::table::{generated_guest_pid, ContainerRecord, ContainerTable};
use crate::vmm::types::GuestContainerConfiguration;
use crate::vmm::VmmController;

/// Shared, per-call state threaded through the pipeline. Cheap to clone
/// (every field is an `Arc` or plain `Clone` data); tasks take ownership of
/// their slice of work via the interior `Mutex`-guarded slots.
#[derive(Clone)]
pub struct ProvisionCtx {
    pub container_id: String,
    pub layout: StateLayout,
    pub policy: Arc<Policy>,
    pub command: Arc<Vec<String>>,
    pub allocate_tty: bool,
    pub keep_artifacts: bool,
    pub guest_io: Arc<Mutex<Option<GuestIo>>>,
    pub rootfs_disk_path: Arc<Mutex<Option<PathBuf>>>,
    pub guest_config: Arc<Mutex<Option<GuestContainerConfiguration>>>,
    pub vmm_controller: Arc<Mutex<Box<dyn VmmController>>>,
    pub handler_table: HandlerTable,
    pub table: ContainerTable,
}

pub struct CreateContainerDirTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for CreateContainerDirTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> HopsResult<()> {
        let dir = ctx.layout.container_dir(&ctx.container_id);
        std::fs::create_dir_all(&dir)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "create_container_dir"
    }
}

pub struct ProvisionRootfsTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for ProvisionRootfsTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> HopsResult<()> {
        let base = match &ctx.policy.rootfs_image {
            Some(reference) => validator::resolve_rootfs_reference_with_layout(
                reference,
                &ctx.layout,
            )?,
            None => ctx.layout.default_rootfs(),
        };
        let copy_path = ctx.layout.container_rootfs_copy(&ctx.container_id);
        std::fs::copy(&base, &copy_path).map_err(|e| {
            HopsError::Io(format!(
                "failed to provision rootfs copy at {}: {e}",
                copy_path.display()
            ))
        })?;
        *ctx.rootfs_disk_path.lock().await = Some(copy_path);
        Ok(())
    }

    fn name(&self) -> &str {
        "provision_rootfs"
    }
}

pub struct ConfigureGuestTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for ConfigureGuestTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> HopsResult<()> {
        let io = ctx.guest_io.lock().await.take().unwrap_or_default();
        let config = enforcer::configure(&ctx.policy, &ctx.command, io, ctx.allocate_tty);
        *ctx.guest_config.lock().await = Some(config);
        Ok(())
    }

    fn name(&self) -> &str {
        "configure_guest"
    }
}

pub struct SpawnContainerTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for SpawnContainerTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> HopsResult<()> {
        let config = ctx
            .guest_config
            .lock()
            .await
            .clone()
            .ok_or_else(|| HopsError::Internal("guest configuration missing at spawn".to_string()))?;

        let record = ContainerRecord {
            container_id: ctx.container_id.clone(),
            policy_name: ctx.policy.name.clone(),
            command_args: ctx.command.as_ref().clone(),
            generated_guest_pid: generated_guest_pid(&ctx.container_id),
            started_at: std::time::SystemTime::now(),
            finished_at: None,
            exit_code: None,
            keep_artifacts: ctx.keep_artifacts,
            container_dir: ctx.layout.container_dir(&ctx.container_id),
            rootfs_copy_path: ctx.layout.container_rootfs_copy(&ctx.container_id),
        };
        ctx.table.insert(record).await;

        let start_result = ctx
            .vmm_controller
            .lock()
            .await
            .start(&ctx.container_id, &config)
            .await;
        let handler = match start_result {
            Ok(handler) => handler,
            Err(e) => {
                // The record is already visible via list()/status(); a
                // start() failure never runs the normal exit handler (the
                // guest never started, so nothing will ever call it), so
                // undo the insertion here instead of leaving it orphaned.
                ctx.table.remove(&ctx.container_id).await;
                return Err(e);
            }
        };
        ctx.handler_table.insert(ctx.container_id.clone(), handler).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "spawn_container"
    }
}

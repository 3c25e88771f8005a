//! Engine Supervisor entry point: resolves the state directory, starts the
//! Sandbox Manager and Control Service, and serves until a termination
//! signal triggers graceful shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use hops::control::ControlService;
use hops::sandbox::SandboxManager;
use hops::supervisor::EngineSupervisor;
use hops::vmm::controller::ShimController;
use hops::{HopsError, HopsResult};
use hops_shared::StateLayout;

#[derive(Parser, Debug)]
#[command(name = "hopsd", about = "Engine supervisor for the hops command execution engine")]
struct Args {
    /// Override the state directory (default: ~/.hops).
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!(error = %e, kind = e.kind(), "hopsd exited with error");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> HopsResult<()> {
    let layout = StateLayout::resolve(args.state_dir).ok_or_else(|| {
        HopsError::Environment("could not resolve a home directory for the state directory".to_string())
    })?;

    let supervisor = EngineSupervisor::start(layout.clone())?;

    let controller: Box<dyn hops::vmm::VmmController> = Box::new(ShimController::new(layout.clone()));
    let manager = Arc::new(SandboxManager::new(layout, controller).await?);
    let control = ControlService::new(manager.clone());

    supervisor.serve(manager, control).await
}

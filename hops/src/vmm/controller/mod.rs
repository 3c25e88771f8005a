//! Subprocess-isolated VM controller.
//!
//! `krun_start_enter` takes over the calling thread once the guest boots,
//! so every VM is spawned in its own `hops-vmshim` subprocess rather than
//! in-process, using a `ShimController`/`ShimHandler` split retargeted at
//! one guest container instead of one long-lived box.
//!
//! - [`VmmController`]: the spawn operation, creates a [`VmmHandler`].
//! - [`VmmHandler`]: runtime operations on a running VM (stop, metrics).

mod handler;
mod shim;
mod spawn;

use crate::vmm::types::GuestContainerConfiguration;
use hops_shared::errors::HopsResult;

pub use handler::{VmmHandler, VmmMetrics};
pub use shim::{ShimController, ShimHandler};

/// Spawns a new VM and returns a handler for runtime operations. The
/// caller is responsible for wiring `bundle`'s stdout/stderr sinks and
/// stdin source to the actual guest I/O once the container is running.
#[async_trait::async_trait]
pub trait VmmController: Send {
    async fn start(
        &mut self,
        container_id: &str,
        bundle: &GuestContainerConfiguration,
    ) -> HopsResult<Box<dyn VmmHandler>>;
}

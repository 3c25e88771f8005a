//! Runtime operations on a running VM, separate from spawning (see
//! [`super::VmmController`]).

use hops_shared::errors::HopsResult;

/// Raw metrics collected from a running guest container.
#[derive(Clone, Debug, Default)]
pub struct VmmMetrics {
    pub cpu_nanoseconds: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub network_rx_bytes: Option<u64>,
    pub network_tx_bytes: Option<u64>,
}

/// Trait for runtime operations on a running VM: stop, metrics, liveness,
/// pid. Kept separate from [`super::VmmController`] so the spawn path and
/// the runtime-operations path can evolve independently (e.g. attaching a
/// handler to an already-running subprocess by pid).
pub trait VmmHandler: Send {
    fn stop(&mut self) -> HopsResult<()>;
    fn metrics(&self) -> HopsResult<VmmMetrics>;
    fn is_running(&self) -> bool;
    fn pid(&self) -> u32;
}

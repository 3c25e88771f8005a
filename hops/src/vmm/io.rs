//! Guest I/O boundary traits. The Capability Enforcer (E) only needs to
//! know *whether* a sink/source was supplied; the guest I/O bridge inside
//! the Sandbox Manager (S) is what actually calls through them.

use async_trait::async_trait;

/// A write-only handle for one guest file descriptor (stdout or stderr).
/// Implementations enqueue `OutputChunk`s into a bounded channel consumed
/// by the streaming writer; `write` backpressures the guest I/O bridge
/// when that channel is full rather than dropping data.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write(&self, data: &[u8]);
}

/// A readable byte source backing a container's stdin. Implemented by
/// `sandbox::StdinInjector`.
#[async_trait]
pub trait StdinSource: Send + Sync {
    /// Read the next chunk, or `None` once the source has finished and
    /// been fully drained.
    async fn read_chunk(&self) -> Option<Vec<u8>>;
}

//! Single-producer, single-consumer stdin byte stream bridging the Control
//! Service's incoming `Stdin` chunks to the guest I/O bridge.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::vmm::io::StdinSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InjectorState {
    Open,
    Closed,
}

/// Thread-safe. `write` is called by the producer (C); `read_chunk` by the
/// consumer (the guest I/O bridge inside S). After `finish()`, writes are
/// silently dropped.
pub struct StdinInjector {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    receiver: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    state: Mutex<InjectorState>,
}

impl StdinInjector {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            state: Mutex::new(InjectorState::Open),
        }
    }

    /// Enqueue a chunk for the consumer. Silently dropped once closed.
    pub async fn write(&self, bytes: Vec<u8>) {
        if *self.state.lock().await == InjectorState::Closed {
            return;
        }
        let _ = self.sender.send(bytes);
    }

    /// Idempotent: mark the injector closed. The consumer observes the
    /// channel draining, then `None`.
    pub async fn finish(&self) {
        *self.state.lock().await = InjectorState::Closed;
    }
}

impl Default for StdinInjector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StdinSource for StdinInjector {
    async fn read_chunk(&self) -> Option<Vec<u8>> {
        let mut receiver = self.receiver.lock().await;
        if *self.state.lock().await == InjectorState::Closed {
            // Drain anything already queued before signalling end-of-stream.
            match receiver.try_recv() {
                Ok(chunk) => return Some(chunk),
                Err(_) => return None,
            }
        }
        receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_chunks_in_order() {
        let injector = StdinInjector::new();
        injector.write(b"hello".to_vec()).await;
        injector.write(b"world".to_vec()).await;
        assert_eq!(injector.read_chunk().await, Some(b"hello".to_vec()));
        assert_eq!(injector.read_chunk().await, Some(b"world".to_vec()));
    }

    #[tokio::test]
    async fn finish_drains_then_ends_stream() {
        let injector = StdinInjector::new();
        injector.write(b"queued".to_vec()).await;
        injector.finish().await;
        assert_eq!(injector.read_chunk().await, Some(b"queued".to_vec()));
        assert_eq!(injector.read_chunk().await, None);
    }

    #[tokio::test]
    async fn writes_after_finish_are_dropped() {
        let injector = StdinInjector::new();
        injector.finish().await;
        injector.write(b"late".to_vec()).await;
        assert_eq!(injector.read_chunk().await, None);
    }

    #[tokio::test]
    async fn finish_is_idempotent() {
        let injector = StdinInjector::new();
        injector.finish().await;
        injector.finish().await;
        assert_eq!(injector.read_chunk().await, None);
    }
}

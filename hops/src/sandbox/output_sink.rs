//! Write-only guest output handle. Writes enqueue raw bytes into a bounded
//! channel; the Control Service's streaming writer tags and forwards them
//! as `OutputChunk`s. Backpressure flows through the channel: a full
//! channel makes `write` wait rather than dropping data or blocking the
//! guest I/O bridge's thread.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::vmm::io::OutputSink;

const CHANNEL_CAPACITY: usize = 256;

pub struct ChannelOutputSink {
    sender: mpsc::Sender<Vec<u8>>,
}

impl ChannelOutputSink {
    pub fn channel() -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl OutputSink for ChannelOutputSink {
    async fn write(&self, data: &[u8]) {
        if self.sender.send(data.to_vec()).await.is_err() {
            tracing::warn!("dropping output chunk: receiver gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn written_bytes_are_received_in_order() {
        let (sink, mut rx) = ChannelOutputSink::channel();
        sink.write(b"first").await;
        sink.write(b"second").await;
        assert_eq!(rx.recv().await, Some(b"first".to_vec()));
        assert_eq!(rx.recv().await, Some(b"second".to_vec()));
    }
}

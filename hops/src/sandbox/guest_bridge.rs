//! Connects to the per-container guest socket (bridged to the guest's
//! vsock control channel by libkrun) and fans frames out to the sinks and
//! in from the stdin source produced by the Capability Enforcer.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use crate::vmm::guest_protocol::{read_frame, write_frame, Frame};
use crate::vmm::io::{OutputSink, StdinSource};

const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(20);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs until the guest reports Exit or the connection closes, returning
/// the observed exit code (-1 if the connection closed without an Exit
/// frame, matching the "exit before wait returns" failure semantics).
pub async fn run(
    guest_socket_path: &Path,
    stdout_sink: Option<Arc<dyn OutputSink>>,
    stderr_sink: Option<Arc<dyn OutputSink>>,
    stdin_source: Option<Arc<dyn StdinSource>>,
) -> i32 {
    let stream = match connect_with_retry(guest_socket_path).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("failed to connect to guest socket: {e}");
            return -1;
        }
    };

    let (mut read_half, write_half) = stream.into_split();

    let writer_task = stdin_source.map(|source| {
        tokio::spawn(async move {
            let mut write_half = write_half;
            loop {
                match source.read_chunk().await {
                    Some(chunk) => {
                        if write_frame(&mut write_half, &Frame::Stdin(chunk)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            let _ = write_half.shutdown().await;
        })
    });

    let exit_code = loop {
        match read_frame(&mut read_half).await {
            Ok(Some(Frame::Stdout(data))) => {
                if let Some(sink) = &stdout_sink {
                    sink.write(&data).await;
                }
            }
            Ok(Some(Frame::Stderr(data))) => {
                if let Some(sink) = &stderr_sink {
                    sink.write(&data).await;
                }
            }
            Ok(Some(Frame::Exit(code))) => break code,
            Ok(Some(Frame::Stdin(_))) => {
                // Guest never sends Stdin frames; ignore if it somehow does.
            }
            Ok(None) => break -1,
            Err(e) => {
                tracing::warn!("guest control channel read error: {e}");
                break -1;
            }
        }
    };

    if let Some(task) = writer_task {
        task.abort();
    }

    exit_code
}

async fn connect_with_retry(path: &Path) -> std::io::Result<UnixStream> {
    let deadline = Instant::now() + CONNECT_TIMEOUT;
    loop {
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(e) if Instant::now() < deadline => {
                let _ = e;
                tokio::time::sleep(CONNECT_POLL_INTERVAL).await;
            }
            Err(e) => return Err(e),
        }
    }
}

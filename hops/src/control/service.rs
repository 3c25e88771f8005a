//! `Control` trait implementation: the tonic-generated RPC methods,
//! thin wrappers around [`SandboxManager`] plus the streaming writer that
//! fans stdout/stderr sinks and the exit code into one `OutputChunk` stream.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status, Streaming};

use hops_shared::generated;
use hops_shared::generated::control_server::Control;

use crate::sandbox::{ChannelOutputSink, RunRequest as SandboxRunRequest, SandboxManager};

use super::convert;

type OutputChunkStream = Pin<Box<dyn Stream<Item = Result<generated::OutputChunk, Status>> + Send + 'static>>;

/// Wraps a [`SandboxManager`] behind the generated `Control` RPC surface.
pub struct ControlService {
    manager: Arc<SandboxManager>,
    start_time_millis: i64,
    accepting: Arc<AtomicBool>,
}

impl ControlService {
    pub fn new(manager: Arc<SandboxManager>) -> Self {
        Self {
            manager,
            start_time_millis: convert::system_time_to_millis(SystemTime::now()),
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stop accepting new `RunSandbox*` calls. Part of the graceful
    /// shutdown sequence driven by the engine supervisor.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Shared flag the engine supervisor flips at the start of graceful
    /// shutdown, before this service itself is handed to the tonic server.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.accepting.clone()
    }
}

fn make_output_chunk(
    container_id: &str,
    kind: generated::OutputChunkType,
    data: Vec<u8>,
    exit_code: Option<i32>,
) -> generated::OutputChunk {
    generated::OutputChunk {
        container_id: container_id.to_string(),
        r#type: kind as i32,
        data,
        timestamp_millis: convert::system_time_to_millis(SystemTime::now()),
        exit_code,
    }
}

#[tonic::async_trait]
impl Control for ControlService {
    async fn run_sandbox(
        &self,
        request: Request<generated::RunRequest>,
    ) -> Result<Response<generated::RunResponse>, Status> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Ok(Response::new(generated::RunResponse {
                success: false,
                error: "engine is shutting down".to_string(),
                container_id: String::new(),
            }));
        }

        let req = request.into_inner();
        let (policy, command) = match convert::policy_and_command_from_run_request(&req) {
            Ok(v) => v,
            Err(e) => {
                return Ok(Response::new(generated::RunResponse {
                    success: false,
                    error: e.to_string(),
                    container_id: String::new(),
                }))
            }
        };

        let container_id = uuid::Uuid::new_v4().to_string();
        let sandbox_request = SandboxRunRequest {
            container_id: container_id.clone(),
            policy,
            command,
            keep_artifacts: req.keep_artifacts,
            allocate_tty: req.allocate_tty,
            stdout_sink: None,
            stderr_sink: None,
            bind_stdin: false,
        };

        match self.manager.run(sandbox_request).await {
            Ok(_handle) => Ok(Response::new(generated::RunResponse {
                success: true,
                error: String::new(),
                container_id,
            })),
            Err(e) => Ok(Response::new(generated::RunResponse {
                success: false,
                error: e.to_string(),
                container_id: String::new(),
            })),
        }
    }

    type RunSandboxStreamingStream = OutputChunkStream;

    async fn run_sandbox_streaming(
        &self,
        request: Request<Streaming<generated::InputChunk>>,
    ) -> Result<Response<Self::RunSandboxStreamingStream>, Status> {
        let mut in_stream = request.into_inner();

        let first = in_stream
            .message()
            .await
            .map_err(|e| Status::cancelled(format!("input stream closed before Run chunk: {e}")))?
            .ok_or_else(|| Status::invalid_argument("input stream closed before Run chunk"))?;

        let run_request = match first.payload {
            Some(generated::input_chunk::Payload::Run(r)) => r,
            _ => {
                return Err(Status::invalid_argument(
                    "first InputChunk must carry a RunRequest",
                ))
            }
        };

        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Status::unavailable("engine is shutting down"));
        }

        let (policy, command) = convert::policy_and_command_from_run_request(&run_request)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let container_id = uuid::Uuid::new_v4().to_string();
        let (stdout_sink, stdout_rx) = ChannelOutputSink::channel();
        let (stderr_sink, stderr_rx) = ChannelOutputSink::channel();

        let sandbox_request = SandboxRunRequest {
            container_id: container_id.clone(),
            policy,
            command,
            keep_artifacts: run_request.keep_artifacts,
            allocate_tty: run_request.allocate_tty,
            stdout_sink: Some(Arc::new(stdout_sink)),
            stderr_sink: Some(Arc::new(stderr_sink)),
            bind_stdin: run_request.allocate_tty,
        };

        let handle = self
            .manager
            .run_streaming(sandbox_request)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        // Forward subsequent Stdin chunks to the injector; a closed or
        // errored request stream triggers `stop` (client cancellation).
        let manager = self.manager.clone();
        let stdin_injector = handle.stdin_injector.clone();
        let cancel_container_id = container_id.clone();
        tokio::spawn(async move {
            loop {
                match in_stream.message().await {
                    Ok(Some(chunk)) => match chunk.payload {
                        Some(generated::input_chunk::Payload::Stdin(bytes)) => {
                            if let Some(injector) = &stdin_injector {
                                injector.write(bytes).await;
                            }
                        }
                        Some(generated::input_chunk::Payload::Resize(_)) => {
                            tracing::debug!(
                                container_id = %cancel_container_id,
                                "ignoring resize hint"
                            );
                        }
                        Some(generated::input_chunk::Payload::Run(_)) | None => {}
                    },
                    Ok(None) => {
                        if let Some(injector) = &stdin_injector {
                            injector.finish().await;
                        }
                        break;
                    }
                    Err(_) => {
                        if let Some(injector) = &stdin_injector {
                            injector.finish().await;
                        }
                        let _ = manager.stop(&cancel_container_id).await;
                        break;
                    }
                }
            }
        });

        let output = async_stream::stream! {
            let merged = ReceiverStream::new(stdout_rx)
                .map(|data| (generated::OutputChunkType::Stdout, data))
                .merge(ReceiverStream::new(stderr_rx).map(|data| (generated::OutputChunkType::Stderr, data)));
            tokio::pin!(merged);
            let mut merged_done = false;
            let exit_code = handle.exit_code;
            tokio::pin!(exit_code);

            loop {
                tokio::select! {
                    biased;
                    item = merged.next(), if !merged_done => {
                        match item {
                            Some((kind, data)) => yield Ok(make_output_chunk(&container_id, kind, data, None)),
                            None => merged_done = true,
                        }
                    }
                    exit = &mut exit_code => {
                        let code = exit.unwrap_or(-1);
                        yield Ok(make_output_chunk(&container_id, generated::OutputChunkType::Exit, Vec::new(), Some(code)));
                        break;
                    }
                }
            }
        };

        Ok(Response::new(Box::pin(output) as Self::RunSandboxStreamingStream))
    }

    async fn stop_sandbox(
        &self,
        request: Request<generated::StopRequest>,
    ) -> Result<Response<generated::StopResponse>, Status> {
        let req = request.into_inner();
        match self.manager.stop(&req.container_id).await {
            Ok(()) => Ok(Response::new(generated::StopResponse {
                success: true,
                error: String::new(),
            })),
            Err(e) => Ok(Response::new(generated::StopResponse {
                success: false,
                error: e.to_string(),
            })),
        }
    }

    async fn list_sandboxes(
        &self,
        _request: Request<generated::ListRequest>,
    ) -> Result<Response<generated::ListResponse>, Status> {
        let sandboxes = self
            .manager
            .list()
            .await
            .iter()
            .map(convert::summary_to_wire)
            .collect();
        Ok(Response::new(generated::ListResponse {
            success: true,
            error: String::new(),
            sandboxes,
        }))
    }

    async fn get_status(
        &self,
        request: Request<generated::StatusRequest>,
    ) -> Result<Response<generated::SandboxStatus>, Status> {
        let req = request.into_inner();
        match self.manager.status(&req.container_id).await {
            Ok(summary) => Ok(Response::new(generated::SandboxStatus {
                success: true,
                error: String::new(),
                sandbox: Some(convert::summary_to_wire(&summary)),
            })),
            Err(e) => Ok(Response::new(generated::SandboxStatus {
                success: false,
                error: e.to_string(),
                sandbox: None,
            })),
        }
    }

    async fn get_engine_status(
        &self,
        _request: Request<generated::EngineStatusRequest>,
    ) -> Result<Response<generated::EngineStatusResponse>, Status> {
        Ok(Response::new(generated::EngineStatusResponse {
            success: true,
            error: String::new(),
            active_container_count: self.manager.active_count() as u32,
            engine_start_time_millis: self.start_time_millis,
        }))
    }
}

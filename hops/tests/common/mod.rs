//! Shared test scaffolding: a fake VM manager controller standing in for
//! `hops-vmshim`/libkrun, and a temp-backed state layout with the images
//! the Sandbox Manager checks for at startup.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UnixListener;
use tokio::sync::oneshot;

use hops::vmm::controller::{VmmController, VmmHandler, VmmMetrics};
use hops::vmm::guest_protocol::{write_frame, Frame};
use hops::vmm::types::GuestContainerConfiguration;
use hops_shared::errors::HopsResult;
use hops_shared::layout::StateLayout;

/// A temp-backed state directory with empty kernel/initfs/rootfs images
/// in place, satisfying `SandboxManager::new`'s startup checks.
pub struct TestState {
    pub _dir: tempfile::TempDir,
    pub layout: StateLayout,
}

pub fn test_state() -> TestState {
    let dir = tempfile::tempdir().unwrap();
    let layout = StateLayout::new(dir.path().join(".hops"));
    layout.prepare().unwrap();
    std::fs::write(layout.kernel_image(), b"kernel").unwrap();
    std::fs::write(layout.init_filesystem(), b"initfs").unwrap();
    std::fs::write(layout.default_rootfs(), b"rootfs").unwrap();
    TestState { _dir: dir, layout }
}

/// Controls what the fake guest does once a client connects to its
/// control socket.
pub enum FakeGuestBehavior {
    /// Write the given frames immediately, in order (an `Exit` frame ends
    /// the connection from the guest's side).
    Scripted(Vec<Frame>),
    /// Accept the connection and hold it open until `stop()` is called on
    /// the returned handler, then close it without sending `Exit` -
    /// mirrors what happens when the VM is killed out from under the
    /// bridge.
    HoldUntilStopped,
}

pub struct FakeVmmController {
    layout: StateLayout,
    behavior: FakeGuestBehavior,
}

impl FakeVmmController {
    pub fn new(layout: StateLayout, behavior: FakeGuestBehavior) -> Self {
        Self { layout, behavior }
    }
}

#[async_trait]
impl VmmController for FakeVmmController {
    async fn start(
        &mut self,
        container_id: &str,
        _bundle: &GuestContainerConfiguration,
    ) -> HopsResult<Box<dyn VmmHandler>> {
        let socket_path = self.layout.container_guest_socket(container_id);
        let listener = UnixListener::bind(&socket_path)
            .unwrap_or_else(|e| panic!("bind {}: {e}", socket_path.display()));

        let (close_tx, close_rx) = oneshot::channel();

        match std::mem::replace(&mut self.behavior, FakeGuestBehavior::HoldUntilStopped) {
            FakeGuestBehavior::Scripted(frames) => {
                tokio::spawn(async move {
                    let _ = &close_rx;
                    if let Ok((mut stream, _)) = listener.accept().await {
                        for frame in &frames {
                            if write_frame(&mut stream, frame).await.is_err() {
                                break;
                            }
                        }
                    }
                });
            }
            FakeGuestBehavior::HoldUntilStopped => {
                tokio::spawn(async move {
                    if let Ok((stream, _)) = listener.accept().await {
                        let _ = close_rx.await;
                        drop(stream);
                    }
                });
            }
        }

        Ok(Box::new(FakeVmmHandler {
            pid: 4242,
            close_tx: Some(close_tx),
        }))
    }
}

pub struct FakeVmmHandler {
    pid: u32,
    close_tx: Option<oneshot::Sender<()>>,
}

impl VmmHandler for FakeVmmHandler {
    fn stop(&mut self) -> HopsResult<()> {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        Ok(())
    }

    fn metrics(&self) -> HopsResult<VmmMetrics> {
        Ok(VmmMetrics::default())
    }

    fn is_running(&self) -> bool {
        self.close_tx.is_some()
    }

    fn pid(&self) -> u32 {
        self.pid
    }
}

pub fn boxed_controller(layout: StateLayout, behavior: FakeGuestBehavior) -> Box<dyn VmmController> {
    Box::new(FakeVmmController::new(layout, behavior))
}

/// A minimal, validator-accepted policy with the given name.
pub fn minimal_policy(name: &str) -> hops::policy::Policy {
    hops::policy::Policy {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        description: None,
        capability_grant: hops::policy::CapabilityGrant::default(),
        sandbox_config: hops::policy::model::SandboxConfig {
            root_path: "/".into(),
            ..Default::default()
        },
        metadata: Default::default(),
        rootfs_image: None,
    }
}

#[allow(dead_code)]
pub fn channel_sinks() -> (
    Arc<dyn hops::vmm::io::OutputSink>,
    tokio::sync::mpsc::Receiver<Vec<u8>>,
) {
    let (sink, rx) = hops::sandbox::ChannelOutputSink::channel();
    (Arc::new(sink), rx)
}

//! End-to-end Control Service tests: drive the tonic-generated `Control`
//! trait directly (no network transport) against a real Sandbox Manager
//! backed by a fake VM controller.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{boxed_controller, test_state, FakeGuestBehavior, TestState};
use hops::control::ControlService;
use hops::sandbox::SandboxManager;
use hops_shared::generated;
use hops_shared::generated::control_server::Control;
use tonic::Request;

fn sandbox_config(root_path: &str) -> generated::SandboxConfig {
    generated::SandboxConfig {
        root_path: root_path.to_string(),
        mounts: vec![],
        hostname: None,
        working_directory: None,
        environment: vec![],
    }
}

fn inline_policy(name: &str) -> generated::InlinePolicy {
    generated::InlinePolicy {
        name: name.to_string(),
        version: String::new(),
        description: None,
        capability_grant: None,
        sandbox_config: Some(sandbox_config("/")),
        metadata: Default::default(),
        rootfs_image: None,
    }
}

/// Returns the `TestState` alongside the service/manager - the caller
/// must keep it alive for as long as containers may still be running,
/// since dropping it removes the backing temp directory.
async fn service_with(behavior: FakeGuestBehavior) -> (ControlService, Arc<SandboxManager>, TestState) {
    let state = test_state();
    let controller = boxed_controller(state.layout.clone(), behavior);
    let manager = Arc::new(SandboxManager::new(state.layout.clone(), controller).await.unwrap());
    let service = ControlService::new(manager.clone());
    (service, manager, state)
}

#[tokio::test]
async fn run_sandbox_with_valid_inline_policy_succeeds() {
    let state = test_state();
    let controller = boxed_controller(
        state.layout.clone(),
        FakeGuestBehavior::Scripted(vec![hops::vmm::guest_protocol::Frame::Exit(0)]),
    );
    let manager = Arc::new(SandboxManager::new(state.layout.clone(), controller).await.unwrap());
    let service = ControlService::new(manager.clone());

    let request = Request::new(generated::RunRequest {
        command: vec!["/bin/echo".to_string(), "hi".to_string()],
        working_directory: String::new(),
        inline_policy: Some(inline_policy("dev")),
        keep_artifacts: false,
        allocate_tty: false,
    });

    let response = service.run_sandbox(request).await.unwrap().into_inner();
    assert!(response.success, "error: {}", response.error);
    assert!(!response.container_id.is_empty());

    // Let the background exit-handling task clean the table entry up.
    tokio::time::sleep(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn run_sandbox_without_inline_policy_fails_gracefully() {
    let (service, _manager, _state) = service_with(FakeGuestBehavior::HoldUntilStopped).await;

    let request = Request::new(generated::RunRequest {
        command: vec!["/bin/true".to_string()],
        working_directory: String::new(),
        inline_policy: None,
        keep_artifacts: false,
        allocate_tty: false,
    });

    let response = service.run_sandbox(request).await.unwrap().into_inner();
    assert!(!response.success);
    assert!(response.error.contains("inline_policy"));
    assert!(response.container_id.is_empty());
}

#[tokio::test]
async fn run_sandbox_rejects_invalid_policy_without_touching_the_manager() {
    let (service, manager, _state) = service_with(FakeGuestBehavior::HoldUntilStopped).await;

    // A non-absolute root_path fails validation before anything is run.
    let mut policy = inline_policy("dev");
    policy.sandbox_config = Some(sandbox_config(""));

    let request = Request::new(generated::RunRequest {
        command: vec!["/bin/true".to_string()],
        working_directory: String::new(),
        inline_policy: Some(policy),
        keep_artifacts: false,
        allocate_tty: false,
    });

    let response = service.run_sandbox(request).await.unwrap().into_inner();
    assert!(!response.success);
    assert!(manager.list().await.is_empty());
}

#[tokio::test]
async fn list_and_stop_sandboxes_round_trip() {
    let state = test_state();
    let controller = boxed_controller(state.layout.clone(), FakeGuestBehavior::HoldUntilStopped);
    let manager = Arc::new(SandboxManager::new(state.layout.clone(), controller).await.unwrap());
    let service = ControlService::new(manager.clone());

    let run_request = Request::new(generated::RunRequest {
        command: vec!["/bin/sleep".to_string(), "100".to_string()],
        working_directory: String::new(),
        inline_policy: Some(inline_policy("dev")),
        keep_artifacts: false,
        allocate_tty: false,
    });
    let run_response = service.run_sandbox(run_request).await.unwrap().into_inner();
    assert!(run_response.success);
    let container_id = run_response.container_id;

    let list_response = service
        .list_sandboxes(Request::new(generated::ListRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(list_response.sandboxes.len(), 1);
    assert_eq!(list_response.sandboxes[0].container_id, container_id);

    let stop_response = service
        .stop_sandbox(Request::new(generated::StopRequest {
            container_id: container_id.clone(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(stop_response.success);

    let status = service
        .get_engine_status(Request::new(generated::EngineStatusRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert!(status.success);
}

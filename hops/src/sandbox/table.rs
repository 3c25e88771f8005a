//! The shared container table: every live or recently-exited
//! [`ContainerRecord`], keyed by container id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct ContainerRecord {
    pub container_id: String,
    pub policy_name: String,
    pub command_args: Vec<String>,
    pub generated_guest_pid: u32,
    pub started_at: SystemTime,
    pub finished_at: Option<SystemTime>,
    pub exit_code: Option<i32>,
    pub keep_artifacts: bool,
    pub container_dir: PathBuf,
    pub rootfs_copy_path: PathBuf,
}

impl ContainerRecord {
    pub fn state(&self) -> ContainerState {
        if self.finished_at.is_some() {
            ContainerState::Stopped
        } else {
            ContainerState::Running
        }
    }
}

/// Hashes `container_id` into the reserved guest-pid display range. This is
/// a display value only; it never corresponds to a real host or guest pid.
pub fn generated_guest_pid(container_id: &str) -> u32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    container_id.hash(&mut hasher);
    let h = hasher.finish();
    hops_shared::constants::GUEST_PID_BASE
        + (h % hops_shared::constants::GUEST_PID_RANGE as u64) as u32
}

/// Shared, concurrency-safe map from container id to record. Every mutation
/// (insert, remove, mark-finished) flows through the Sandbox Manager.
#[derive(Clone, Default)]
pub struct ContainerTable {
    inner: Arc<RwLock<HashMap<String, ContainerRecord>>>,
}

impl ContainerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: ContainerRecord) {
        self.inner.write().await.insert(record.container_id.clone(), record);
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.contains_key(id)
    }

    pub async fn get(&self, id: &str) -> Option<ContainerRecord> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<ContainerRecord> {
        self.inner.write().await.remove(id)
    }

    pub async fn mark_finished(&self, id: &str, exit_code: Option<i32>) {
        if let Some(record) = self.inner.write().await.get_mut(id) {
            record.finished_at = Some(SystemTime::now());
            record.exit_code = exit_code;
        }
    }

    pub async fn list(&self) -> Vec<ContainerRecord> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_guest_pid_stays_in_reserved_range() {
        for id in ["a", "container-2", "zzzzzzzzzzzzzzzz"] {
            let pid = generated_guest_pid(id);
            assert!(pid >= hops_shared::constants::GUEST_PID_BASE);
            assert!(
                pid < hops_shared::constants::GUEST_PID_BASE
                    + hops_shared::constants::GUEST_PID_RANGE
            );
        }
    }

    #[test]
    fn generated_guest_pid_is_stable_for_same_id() {
        assert_eq!(generated_guest_pid("same"), generated_guest_pid("same"));
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let table = ContainerTable::new();
        let record = ContainerRecord {
            container_id: "abc".to_string(),
            policy_name: "demo".to_string(),
            command_args: vec!["/bin/sh".to_string()],
            generated_guest_pid: generated_guest_pid("abc"),
            started_at: SystemTime::now(),
            finished_at: None,
            exit_code: None,
            keep_artifacts: false,
            container_dir: "/tmp/abc".into(),
            rootfs_copy_path: "/tmp/abc/rootfs.ext4".into(),
        };
        table.insert(record.clone()).await;
        assert!(table.contains("abc").await);
        assert_eq!(table.get("abc").await.unwrap().policy_name, "demo");
        assert_eq!(table.list().await.len(), 1);
    }

    #[tokio::test]
    async fn mark_finished_sets_exit_code_and_timestamp() {
        let table = ContainerTable::new();
        let record = ContainerRecord {
            container_id: "abc".to_string(),
            policy_name: "demo".to_string(),
            command_args: vec![],
            generated_guest_pid: 0,
            started_at: SystemTime::now(),
            finished_at: None,
            exit_code: None,
            keep_artifacts: false,
            container_dir: "/tmp/abc".into(),
            rootfs_copy_path: "/tmp/abc/rootfs.ext4".into(),
        };
        table.insert(record).await;
        table.mark_finished("abc", Some(0)).await;
        let updated = table.get("abc").await.unwrap();
        assert_eq!(updated.exit_code, Some(0));
        assert!(updated.finished_at.is_some());
        assert_eq!(updated.state(), ContainerState::Stopped);
    }
}

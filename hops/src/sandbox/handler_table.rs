//! Map from container id to its running [`VmmHandler`], kept separate from
//! [`super::table::ContainerTable`] since a handler is not `Clone` and the
//! record table's snapshot reads (`list`, `status`) shouldn't need to touch it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::vmm::VmmHandler;

#[derive(Clone, Default)]
pub struct HandlerTable {
    inner: Arc<Mutex<HashMap<String, Box<dyn VmmHandler>>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, container_id: String, handler: Box<dyn VmmHandler>) {
        self.inner.lock().await.insert(container_id, handler);
    }

    pub async fn remove(&self, container_id: &str) -> Option<Box<dyn VmmHandler>> {
        self.inner.lock().await.remove(container_id)
    }

    pub async fn stop(&self, container_id: &str) -> bool {
        if let Some(mut handler) = self.remove(container_id).await {
            if let Err(e) = handler.stop() {
                tracing::warn!(container_id, error = %e, "failed to stop VM handler");
            }
            true
        } else {
            false
        }
    }
}

//! Host-side task service: the authoritative registry plus change fan-out.
//!
//! Every mutation of a host-owned task is pushed to all connected UI
//! windows as a `task.changed` notification so their views stay current.
//! The shutdown drain is the one silent path — windows are already closing
//! when it runs.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::ipc::event::EventBroadcaster;
use crate::tasks::snapshot::TaskSnapshot;
use crate::tasks::store::{MethodResult, TaskError, TaskSide, TaskSpec, TaskStore};
use crate::widgets::WidgetRegistry;

pub struct TaskService {
    store: TaskStore,
    broadcaster: Arc<EventBroadcaster>,
}

impl TaskService {
    pub fn new(widgets: Arc<WidgetRegistry>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            store: TaskStore::new(TaskSide::Host, widgets),
            broadcaster,
        }
    }

    /// Create a host-owned task. The `added` notification goes out only
    /// once the start hook has succeeded; a task left behind by a failed
    /// hook surfaces through `task.list` until the caller removes it.
    pub fn create(
        &self,
        owner_scheme: &str,
        spec: TaskSpec,
    ) -> Result<TaskSnapshot, TaskError> {
        let snapshot = self.store.create(owner_scheme, spec)?;
        info!(id = snapshot.id, name = %snapshot.name, scheme = %owner_scheme, "host task created");
        self.broadcaster
            .broadcast("task.changed", json!({ "type": "added", "task": &snapshot }));
        Ok(snapshot)
    }

    pub fn list(&self, owner_scheme: Option<&str>) -> Vec<TaskSnapshot> {
        self.store.list(owner_scheme)
    }

    pub fn pause(&self, id: u64) -> bool {
        if !self.store.pause(id) {
            return false;
        }
        self.broadcaster
            .broadcast("task.changed", json!({ "type": "paused", "id": id }));
        true
    }

    pub fn resume(&self, id: u64) -> bool {
        if !self.store.resume(id) {
            return false;
        }
        self.broadcaster
            .broadcast("task.changed", json!({ "type": "resumed", "id": id }));
        true
    }

    pub fn remove(&self, id: u64) -> bool {
        if !self.store.remove(id) {
            return false;
        }
        self.broadcaster
            .broadcast("task.changed", json!({ "type": "removed", "id": id }));
        true
    }

    pub fn call_method(&self, id: u64, method: &str, args: &[Value]) -> MethodResult {
        self.store.call_method(id, method, args)
    }

    pub fn task_count(&self) -> usize {
        self.store.len()
    }

    pub fn active_count(&self) -> usize {
        self.store.active_count()
    }

    /// Shutdown drain: pause every surviving active task so cleanup hooks
    /// run before the process exits.
    pub fn shutdown(&self) {
        let paused = self.store.pause_all();
        info!(paused, "background tasks cleaned up");
    }
}

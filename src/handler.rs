//! The handler abstraction mini-app controllers program against.
//!
//! A controller drives its task kind through a [`TaskHandler`] without
//! knowing which side of the process boundary the registry lives on:
//! [`UiTaskHandler`] operates a UI-side store directly and informs the host
//! afterwards, while [`RemoteTaskHandler`] makes round trips into the
//! authoritative host store.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::client::ShellClient;
use crate::tasks::{resolve_widget_name, TaskSnapshot, TaskSpec, TaskStore};
use crate::widgets::WidgetRegistry;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Create a task owned by this handler's scheme and return its snapshot.
    async fn create(&self, spec: TaskSpec) -> Result<TaskSnapshot>;

    /// Tasks visible to this handler, in creation order. A degraded channel
    /// yields an empty list rather than an error — controllers tolerate it.
    async fn list(&self) -> Vec<TaskSnapshot>;

    async fn pause(&self, id: u64) -> bool;
    async fn resume(&self, id: u64) -> bool;
    async fn remove(&self, id: u64) -> bool;

    /// Invoke a named custom method. Failures come back as
    /// `{"error": "..."}` values, never as panics or transport errors.
    async fn call_method(&self, id: u64, method: &str, args: Vec<Value>) -> Value;
}

// ─── UI-side handler ─────────────────────────────────────────────────────────

/// Operates a per-scheme UI-side store. The host is informed of create and
/// remove (fire-and-forget, observability only); pause and resume stay
/// local, as the host holds no authority over UI-owned tasks.
pub struct UiTaskHandler {
    scheme: String,
    store: Arc<TaskStore>,
    host: Option<Arc<ShellClient>>,
}

impl UiTaskHandler {
    /// `host: None` means the window runs outside the host pairing; every
    /// notification then degrades to a logged no-op.
    pub fn new(
        scheme: impl Into<String>,
        store: Arc<TaskStore>,
        host: Option<Arc<ShellClient>>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            store,
            host,
        }
    }

    fn notify_host(&self, method: &str, params: Value) {
        match &self.host {
            Some(client) => client.notify(method, params),
            None => debug!(method = %method, "channel unavailable — skipping host notification"),
        }
    }
}

#[async_trait]
impl TaskHandler for UiTaskHandler {
    async fn create(&self, spec: TaskSpec) -> Result<TaskSnapshot> {
        let snapshot = self.store.create(&self.scheme, spec)?;
        self.notify_host("task.registered", json!({ "task": &snapshot }));
        Ok(snapshot)
    }

    async fn list(&self) -> Vec<TaskSnapshot> {
        self.store.list(Some(&self.scheme))
    }

    async fn pause(&self, id: u64) -> bool {
        self.store.pause(id)
    }

    async fn resume(&self, id: u64) -> bool {
        self.store.resume(id)
    }

    async fn remove(&self, id: u64) -> bool {
        let removed = self.store.remove(id);
        if removed {
            self.notify_host("task.removed", json!({ "id": id }));
        }
        removed
    }

    async fn call_method(&self, id: u64, method: &str, args: Vec<Value>) -> Value {
        self.store.call_method(id, method, &args).into_wire()
    }
}

// ─── Remote handler ──────────────────────────────────────────────────────────

/// Thin remote client over the authoritative host registry. Hooks and
/// custom methods in a spec cannot cross the channel and are dropped here;
/// the host installs its own lifecycle log stubs.
pub struct RemoteTaskHandler {
    scheme: String,
    client: Arc<ShellClient>,
    widgets: Arc<WidgetRegistry>,
}

impl RemoteTaskHandler {
    pub fn new(
        scheme: impl Into<String>,
        client: Arc<ShellClient>,
        widgets: Arc<WidgetRegistry>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            client,
            widgets,
        }
    }

    async fn invoke_flag(&self, method: &str, id: u64) -> bool {
        match self.client.invoke(method, json!({ "id": id })).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(e) => {
                warn!(method = %method, id, err = %e, "host call failed");
                false
            }
        }
    }
}

#[async_trait]
impl TaskHandler for RemoteTaskHandler {
    async fn create(&self, spec: TaskSpec) -> Result<TaskSnapshot> {
        let widget_name = spec
            .widget
            .as_ref()
            .map(|w| resolve_widget_name(&self.scheme, &spec.name, w, &self.widgets));
        let result = self
            .client
            .invoke(
                "task.create",
                json!({
                    "ownerScheme": self.scheme,
                    "name": spec.name,
                    "payload": spec.payload,
                    "widgetName": widget_name,
                }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn list(&self) -> Vec<TaskSnapshot> {
        match self
            .client
            .invoke("task.list", json!({ "ownerScheme": self.scheme }))
            .await
        {
            Ok(value) => serde_json::from_value(value).unwrap_or_default(),
            Err(e) => {
                warn!(err = %e, "task.list failed");
                Vec::new()
            }
        }
    }

    async fn pause(&self, id: u64) -> bool {
        self.invoke_flag("task.pause", id).await
    }

    async fn resume(&self, id: u64) -> bool {
        self.invoke_flag("task.resume", id).await
    }

    async fn remove(&self, id: u64) -> bool {
        self.invoke_flag("task.remove", id).await
    }

    async fn call_method(&self, id: u64, method: &str, args: Vec<Value>) -> Value {
        match self
            .client
            .invoke(
                "task.callMethod",
                json!({ "id": id, "method": method, "args": args }),
            )
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(id, method, err = %e, "task.callMethod failed");
                json!({ "error": format!("channel error: {e}") })
            }
        }
    }
}

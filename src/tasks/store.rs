//! Per-side background-task registry.
//!
//! Each process keeps its own `TaskStore`: the host holds the single
//! authoritative store for host-owned tasks, the UI process holds one store
//! per mini-app scheme for UI-owned tasks. Ids are allocated per store,
//! monotonically from 1, and never reused — the two sides' id spaces are
//! independent.
//!
//! Lookup misses come back as `false`/empty returns, never as errors:
//! controllers poll defensively and may race with removal. Lifecycle hooks
//! run while the registry lock is held and must not call back into the same
//! store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::tasks::snapshot::{to_snapshot, TaskSnapshot, WidgetRef};
use crate::widgets::WidgetRegistry;

/// Which side of the process boundary a store lives on. Tasks created in a
/// UI-side store are marked remote in their snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSide {
    Host,
    Ui,
}

/// Start hook: runs exactly once, synchronously, when the task is created.
pub type StartHook = Box<dyn FnOnce(&Value) -> Result<()> + Send>;
/// Pause/resume hook.
pub type LifecycleHook = Box<dyn FnMut() + Send>;
/// A named method remote callers can invoke on the task.
pub type TaskMethod = Box<dyn FnMut(&[Value]) -> Result<Value> + Send>;

#[derive(Debug, Error)]
pub enum TaskError {
    /// The start hook failed. The task remains registered under `id`;
    /// callers that want rollback must remove it explicitly.
    #[error("start hook failed for task {id}: {message}")]
    StartFailed { id: u64, message: String },
}

/// Everything a caller supplies to create a task. The registry fills in the
/// id, owning scheme, side, and initial `active = true` state.
pub struct TaskSpec {
    pub name: String,
    pub payload: Value,
    pub widget: Option<WidgetRef>,
    on_start: Option<StartHook>,
    on_pause: Option<LifecycleHook>,
    on_resume: Option<LifecycleHook>,
    methods: BTreeMap<String, TaskMethod>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            widget: None,
            on_start: None,
            on_pause: None,
            on_resume: None,
            methods: BTreeMap::new(),
        }
    }

    pub fn widget(mut self, widget: WidgetRef) -> Self {
        self.widget = Some(widget);
        self
    }

    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Value) -> Result<()> + Send + 'static,
    {
        self.on_start = Some(Box::new(hook));
        self
    }

    pub fn on_pause<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on_pause = Some(Box::new(hook));
        self
    }

    pub fn on_resume<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on_resume = Some(Box::new(hook));
        self
    }

    /// Add a custom method invokable by name, locally or over the channel.
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&[Value]) -> Result<Value> + Send + 'static,
    {
        self.methods.insert(name.into(), Box::new(f));
        self
    }
}

/// A live task record. Hooks and methods exist only in the owning side's
/// memory and never cross the process boundary.
pub(crate) struct Task {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) owner_scheme: String,
    pub(crate) payload: Value,
    pub(crate) active: bool,
    pub(crate) is_remote: bool,
    pub(crate) widget: Option<WidgetRef>,
    on_pause: Option<LifecycleHook>,
    on_resume: Option<LifecycleHook>,
    methods: BTreeMap<String, TaskMethod>,
}

impl Task {
    pub(crate) fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }
}

/// Outcome of a custom-method invocation. Failures are carried as values —
/// the registry never propagates an error across this call.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResult {
    Value(Value),
    Error(String),
}

impl MethodResult {
    /// Wire form: the method's return value, or `{"error": "..."}`.
    pub fn into_wire(self) -> Value {
        match self {
            MethodResult::Value(value) => value,
            MethodResult::Error(message) => serde_json::json!({ "error": message }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MethodResult::Error(_))
    }
}

struct Inner {
    next_id: u64,
    tasks: Vec<Task>,
}

pub struct TaskStore {
    side: TaskSide,
    widgets: Arc<WidgetRegistry>,
    inner: Mutex<Inner>,
}

impl TaskStore {
    pub fn new(side: TaskSide, widgets: Arc<WidgetRegistry>) -> Self {
        Self {
            side,
            widgets,
            inner: Mutex::new(Inner {
                next_id: 1,
                tasks: Vec::new(),
            }),
        }
    }

    pub fn side(&self) -> TaskSide {
        self.side
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a task and run its start hook synchronously before returning.
    ///
    /// The task is registered before the hook runs; a failing hook leaves it
    /// registered and [`TaskError::StartFailed`] carries the allocated id so
    /// the caller can remove it.
    pub fn create(&self, owner_scheme: &str, spec: TaskSpec) -> Result<TaskSnapshot, TaskError> {
        let TaskSpec {
            name,
            payload,
            widget,
            on_start,
            on_pause,
            on_resume,
            methods,
        } = spec;

        let (snapshot, payload_copy) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            let task = Task {
                id,
                name,
                owner_scheme: owner_scheme.to_string(),
                payload,
                active: true,
                is_remote: self.side == TaskSide::Ui,
                widget,
                on_pause,
                on_resume,
                methods,
            };
            let snapshot = to_snapshot(&task, &self.widgets);
            let payload_copy = task.payload.clone();
            inner.tasks.push(task);
            (snapshot, payload_copy)
        };

        // The start hook runs outside the registry lock so it may inspect
        // the store it was created in.
        if let Some(hook) = on_start {
            if let Err(err) = hook(&payload_copy) {
                warn!(id = snapshot.id, name = %snapshot.name, err = %err, "start hook failed");
                return Err(TaskError::StartFailed {
                    id: snapshot.id,
                    message: err.to_string(),
                });
            }
        }

        debug!(
            id = snapshot.id,
            name = %snapshot.name,
            scheme = %snapshot.owner_scheme,
            "task created"
        );
        Ok(snapshot)
    }

    /// All tasks in creation order, optionally filtered by owning scheme.
    pub fn list(&self, owner_scheme: Option<&str>) -> Vec<TaskSnapshot> {
        let inner = self.lock();
        inner
            .tasks
            .iter()
            .filter(|t| owner_scheme.map_or(true, |s| t.owner_scheme == s))
            .map(|t| to_snapshot(t, &self.widgets))
            .collect()
    }

    pub fn pause(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        task.active = false;
        if let Some(hook) = task.on_pause.as_mut() {
            hook();
        }
        debug!(id, "task paused");
        true
    }

    pub fn resume(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        task.active = true;
        if let Some(hook) = task.on_resume.as_mut() {
            hook();
        }
        debug!(id, "task resumed");
        true
    }

    /// Remove a task, running its pause hook first if it is still active so
    /// cleanup happens before deallocation.
    pub fn remove(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let Some(idx) = inner.tasks.iter().position(|t| t.id == id) else {
            return false;
        };
        {
            let task = &mut inner.tasks[idx];
            if task.active {
                if let Some(hook) = task.on_pause.as_mut() {
                    hook();
                }
            }
        }
        let task = inner.tasks.remove(idx);
        debug!(id, name = %task.name, "task removed");
        true
    }

    /// Invoke a named custom method on a task. Unknown ids, unknown method
    /// names, and failing methods all come back as [`MethodResult::Error`].
    pub fn call_method(&self, id: u64, method: &str, args: &[Value]) -> MethodResult {
        let mut inner = self.lock();
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == id) else {
            return MethodResult::Error(format!("Method {method} not found on task {id}"));
        };
        let Some(f) = task.methods.get_mut(method) else {
            return MethodResult::Error(format!("Method {method} not found on task {id}"));
        };
        match f(args) {
            Ok(value) => MethodResult::Value(value),
            Err(err) => {
                warn!(id, method, err = %err, "task method failed");
                MethodResult::Error(format!("Method {method} failed on task {id}: {err}"))
            }
        }
    }

    /// Direct payload mutation for the owning controller. Returns `false`
    /// if the id is unknown.
    pub fn update_payload(&self, id: u64, f: impl FnOnce(&mut Value)) -> bool {
        let mut inner = self.lock();
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        f(&mut task.payload);
        true
    }

    /// Pause every active task (best-effort). Returns how many were paused.
    /// The host shutdown path calls this so cleanup hooks run before exit.
    pub fn pause_all(&self) -> usize {
        let mut inner = self.lock();
        let mut paused = 0;
        for task in inner.tasks.iter_mut().filter(|t| t.active) {
            task.active = false;
            if let Some(hook) = task.on_pause.as_mut() {
                hook();
            }
            paused += 1;
        }
        paused
    }

    pub fn active_count(&self) -> usize {
        self.lock().tasks.iter().filter(|t| t.active).count()
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }
}

//! Process-wide registry of live-activity widget handles.
//!
//! A background task may reference a presentational "live activity" view —
//! the small widget the shell overlay renders while the task runs. Handles
//! to these views cannot cross the process boundary, so each process keeps
//! a name→handle table and ships only the symbolic name. Entries live for
//! the process lifetime: they are added or overwritten, never removed.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// A live-activity view shown for a background task (e.g. the playback
/// widget rendered in the shell overlay while music plays).
#[derive(Debug)]
pub struct LiveActivity {
    /// UI entry point that renders this view, resolved inside the owning
    /// mini-app's bundle.
    pub entry: String,
}

/// Identity-comparable handle to a [`LiveActivity`].
#[derive(Debug, Clone)]
pub struct WidgetHandle(Arc<LiveActivity>);

impl WidgetHandle {
    pub fn new(entry: impl Into<String>) -> Self {
        Self(Arc::new(LiveActivity {
            entry: entry.into(),
        }))
    }

    pub fn entry(&self) -> &str {
        &self.0.entry
    }

    /// Two handles are the same widget iff they share one allocation.
    pub fn same_as(&self, other: &WidgetHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Name→handle table for live-activity views.
#[derive(Default)]
pub struct WidgetRegistry {
    entries: Mutex<HashMap<String, WidgetHandle>>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, WidgetHandle>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handle` under `name`, overwriting any previous entry.
    /// Returns the name for call-site chaining.
    pub fn register(&self, name: &str, handle: WidgetHandle) -> String {
        self.lock().insert(name.to_string(), handle);
        debug!(name = %name, "widget registered");
        name.to_string()
    }

    /// Reverse lookup: the name under which `handle` was registered, if any.
    pub fn resolve_name_for(&self, handle: &WidgetHandle) -> Option<String> {
        self.lock()
            .iter()
            .find(|(_, h)| h.same_as(handle))
            .map(|(name, _)| name.clone())
    }

    /// Register `handle` under a minted `component_<scheme>_<name>_<ts>`
    /// name. Millisecond timestamps make collisions practically (not
    /// cryptographically) impossible.
    pub fn register_minted(
        &self,
        owner_scheme: &str,
        task_name: &str,
        handle: WidgetHandle,
    ) -> String {
        let name = format!(
            "component_{}_{}_{}",
            owner_scheme,
            task_name,
            Utc::now().timestamp_millis()
        );
        self.register(&name, handle)
    }

    pub fn get(&self, name: &str) -> Option<WidgetHandle> {
        self.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

//! Wire projection of a task.
//!
//! Hooks and raw widget handles never cross the process boundary. A
//! snapshot carries the symbolic widget name (minted on demand through the
//! widget registry) and the list of invokable custom-method names, so the
//! remote side can discover what it may call without guessing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tasks::store::Task;
use crate::widgets::{WidgetHandle, WidgetRegistry};

/// Reference to a task's live-activity view: either the symbolic name of an
/// entry in the widget registry, or a direct handle not registered yet.
#[derive(Debug, Clone)]
pub enum WidgetRef {
    Named(String),
    Direct(WidgetHandle),
}

/// The transmissible form of a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: u64,
    pub name: String,
    pub owner_scheme: String,
    pub payload: Value,
    pub active: bool,
    pub is_remote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub method_names: Vec<String>,
}

pub(crate) fn to_snapshot(task: &Task, widgets: &WidgetRegistry) -> TaskSnapshot {
    let widget_name = task
        .widget
        .as_ref()
        .map(|w| resolve_widget_name(&task.owner_scheme, &task.name, w, widgets));
    TaskSnapshot {
        id: task.id,
        name: task.name.clone(),
        owner_scheme: task.owner_scheme.clone(),
        payload: task.payload.clone(),
        active: task.active,
        is_remote: task.is_remote,
        widget_name,
        method_names: task.method_names(),
    }
}

/// Resolve a widget reference to its symbolic name, registering the handle
/// under a minted name when the registry does not know it yet.
pub fn resolve_widget_name(
    owner_scheme: &str,
    task_name: &str,
    widget: &WidgetRef,
    widgets: &WidgetRegistry,
) -> String {
    match widget {
        WidgetRef::Named(name) => name.clone(),
        WidgetRef::Direct(handle) => match widgets.resolve_name_for(handle) {
            Some(name) => name,
            None => widgets.register_minted(owner_scheme, task_name, handle.clone()),
        },
    }
}

//! RPC surface of the host task registry.

use crate::tasks::{TaskSpec, WidgetRef};
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

#[derive(Deserialize)]
struct CreateParams {
    #[serde(rename = "ownerScheme")]
    owner_scheme: String,
    name: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "widgetName")]
    widget_name: Option<String>,
}

#[derive(Deserialize)]
struct IdParams {
    id: u64,
}

#[derive(Deserialize)]
struct CallParams {
    id: u64,
    method: String,
    #[serde(default)]
    args: Vec<Value>,
}

/// `task.create` — create a host-owned task and return its snapshot.
///
/// Hooks cannot cross the channel, so tasks created here carry log-stub
/// lifecycle hooks; their real side effects live in the UI windows that
/// drive them.
pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CreateParams = serde_json::from_value(params)?;
    let name = p.name.clone();
    let mut spec = TaskSpec::new(p.name, p.payload)
        .on_start({
            let name = name.clone();
            move |_| {
                info!(name = %name, "host task started");
                Ok(())
            }
        })
        .on_pause({
            let name = name.clone();
            move || info!(name = %name, "host task paused")
        })
        .on_resume(move || info!(name = %name, "host task resumed"));
    if let Some(widget) = p.widget_name {
        spec = spec.widget(WidgetRef::Named(widget));
    }
    let snapshot = ctx.tasks.create(&p.owner_scheme, spec)?;
    Ok(serde_json::to_value(snapshot)?)
}

/// `task.list` — snapshots of host-owned tasks, optionally filtered by
/// owning scheme.
pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let scheme = params.get("ownerScheme").and_then(Value::as_str);
    Ok(json!(ctx.tasks.list(scheme)))
}

pub async fn pause(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    Ok(json!(ctx.tasks.pause(p.id)))
}

pub async fn resume(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    Ok(json!(ctx.tasks.resume(p.id)))
}

pub async fn remove(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: IdParams = serde_json::from_value(params)?;
    Ok(json!(ctx.tasks.remove(p.id)))
}

/// `task.callMethod` — invoke a custom method on a host-owned task.
/// Failures travel as `{"error": "..."}` result values, never as RPC
/// errors, so callers can distinguish transport faults from method faults.
pub async fn call_method(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CallParams = serde_json::from_value(params)?;
    Ok(ctx.tasks.call_method(p.id, &p.method, &p.args).into_wire())
}

// ─── Fire-and-forget notifications from UI-owned registries ──────────────────

/// `task.registered` — a UI-side registry created a task. Observability
/// only: the host gains no control authority and stores no mirror copy;
/// the event is forwarded so every window can refresh its view.
pub fn registered(params: Value, ctx: &AppContext) {
    let task = params.get("task").cloned().unwrap_or(Value::Null);
    let id = task.get("id").and_then(Value::as_u64);
    let name = task.get("name").and_then(Value::as_str).map(str::to_owned);
    debug!(id = ?id, name = ?name, "UI task registered");
    ctx.broadcaster
        .broadcast("clientTask.changed", json!({ "type": "added", "task": task }));
}

/// `task.removed` — mirror of [`registered`] for removal.
pub fn removed(params: Value, ctx: &AppContext) {
    let id = params.get("id").and_then(Value::as_u64);
    debug!(id = ?id, "UI task removed");
    ctx.broadcaster
        .broadcast("clientTask.changed", json!({ "type": "removed", "id": id }));
}

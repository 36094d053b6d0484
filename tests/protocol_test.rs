//! Integration tests for the JSON-RPC control protocol: dispatch round
//! trips, change broadcasts, notification forwarding, and a full
//! WebSocket round trip through the UI-side client.

use lumend::client::ShellClient;
use lumend::config::ShellConfig;
use lumend::handler::{RemoteTaskHandler, TaskHandler};
use lumend::ipc::{self, dispatch_text};
use lumend::tasks::TaskSpec;
use lumend::widgets::WidgetRegistry;
use lumend::AppContext;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn ctx() -> AppContext {
    AppContext::new(ShellConfig::default(), String::new())
}

async fn call(ctx: &AppContext, method: &str, params: Value) -> Value {
    let req = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
    let resp = dispatch_text(&req.to_string(), ctx)
        .await
        .expect("requests always get a response");
    serde_json::from_str(&resp).unwrap()
}

// ── Request/response round trips ─────────────────────────────────────────────

#[tokio::test]
async fn task_lifecycle_over_dispatch() {
    let ctx = ctx();

    let created = call(
        &ctx,
        "task.create",
        json!({ "ownerScheme": "com.lumen.timer", "name": "Timer", "payload": { "remainingSecs": 60 } }),
    )
    .await;
    let task = &created["result"];
    assert_eq!(task["id"], 1);
    assert_eq!(task["active"], true);
    assert_eq!(task["isRemote"], false);
    assert_eq!(task["payload"]["remainingSecs"], 60);

    let listed = call(&ctx, "task.list", json!({})).await;
    assert_eq!(listed["result"].as_array().unwrap().len(), 1);

    let paused = call(&ctx, "task.pause", json!({ "id": 1 })).await;
    assert_eq!(paused["result"], true);
    let listed = call(&ctx, "task.list", json!({})).await;
    assert_eq!(listed["result"][0]["active"], false);

    let resumed = call(&ctx, "task.resume", json!({ "id": 1 })).await;
    assert_eq!(resumed["result"], true);

    let removed = call(&ctx, "task.remove", json!({ "id": 1 })).await;
    assert_eq!(removed["result"], true);
    let listed = call(&ctx, "task.list", json!({})).await;
    assert!(listed["result"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ping_and_status_answer() {
    let ctx = ctx();
    let pong = call(&ctx, "shell.ping", json!({})).await;
    assert_eq!(pong["result"]["pong"], true);

    call(
        &ctx,
        "task.create",
        json!({ "ownerScheme": "com.lumen.music", "name": "Music" }),
    )
    .await;
    let status = call(&ctx, "shell.status", json!({})).await;
    assert_eq!(status["result"]["tasks"], 1);
    assert_eq!(status["result"]["activeTasks"], 1);
    assert_eq!(status["result"]["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn list_filters_by_owner_scheme() {
    let ctx = ctx();
    call(
        &ctx,
        "task.create",
        json!({ "ownerScheme": "com.lumen.music", "name": "Music" }),
    )
    .await;
    call(
        &ctx,
        "task.create",
        json!({ "ownerScheme": "com.lumen.timer", "name": "Timer" }),
    )
    .await;

    let music = call(&ctx, "task.list", json!({ "ownerScheme": "com.lumen.music" })).await;
    let tasks = music["result"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["name"], "Music");
}

#[tokio::test]
async fn call_method_on_missing_task_returns_error_value() {
    let ctx = ctx();
    let resp = call(
        &ctx,
        "task.callMethod",
        json!({ "id": 99, "method": "toggleMute", "args": [] }),
    )
    .await;
    // A method fault is a result value, not an RPC error.
    assert!(resp.get("error").is_none());
    assert_eq!(
        resp["result"]["error"],
        "Method toggleMute not found on task 99"
    );
}

// ── Protocol errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_json_yields_parse_error() {
    let ctx = ctx();
    let resp: Value =
        serde_json::from_str(&dispatch_text("{not json", &ctx).await.unwrap()).unwrap();
    assert_eq!(resp["error"]["code"], -32700);
}

#[tokio::test]
async fn wrong_jsonrpc_version_is_invalid_request() {
    let ctx = ctx();
    let req = json!({ "jsonrpc": "1.0", "id": 1, "method": "shell.ping" });
    let resp: Value =
        serde_json::from_str(&dispatch_text(&req.to_string(), &ctx).await.unwrap()).unwrap();
    assert_eq!(resp["error"]["code"], -32600);
}

#[tokio::test]
async fn unknown_method_yields_method_not_found() {
    let ctx = ctx();
    let resp = call(&ctx, "task.explode", json!({})).await;
    assert_eq!(resp["error"]["code"], -32601);
}

#[tokio::test]
async fn missing_id_param_yields_invalid_params() {
    let ctx = ctx();
    let resp = call(&ctx, "task.pause", json!({})).await;
    assert_eq!(resp["error"]["code"], -32602);
}

// ── Broadcasts ───────────────────────────────────────────────────────────────

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<String>) -> Value {
    let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("broadcast must arrive")
        .unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn host_mutations_broadcast_task_changed() {
    let ctx = ctx();
    let mut rx = ctx.broadcaster.subscribe();

    call(
        &ctx,
        "task.create",
        json!({ "ownerScheme": "com.lumen.timer", "name": "Timer" }),
    )
    .await;
    let added = next_event(&mut rx).await;
    assert_eq!(added["method"], "task.changed");
    assert_eq!(added["params"]["type"], "added");
    assert_eq!(added["params"]["task"]["id"], 1);

    call(&ctx, "task.pause", json!({ "id": 1 })).await;
    let paused = next_event(&mut rx).await;
    assert_eq!(paused["params"]["type"], "paused");
    assert_eq!(paused["params"]["id"], 1);

    call(&ctx, "task.resume", json!({ "id": 1 })).await;
    assert_eq!(next_event(&mut rx).await["params"]["type"], "resumed");

    call(&ctx, "task.remove", json!({ "id": 1 })).await;
    assert_eq!(next_event(&mut rx).await["params"]["type"], "removed");
}

#[tokio::test]
async fn ui_notifications_are_forwarded_but_not_mirrored() {
    let ctx = ctx();
    let mut rx = ctx.broadcaster.subscribe();

    let note = json!({
        "jsonrpc": "2.0",
        "method": "task.registered",
        "params": { "task": {
            "id": 1, "name": "Music", "ownerScheme": "com.lumen.music",
            "payload": null, "active": true, "isRemote": true
        } }
    });
    let resp = dispatch_text(&note.to_string(), &ctx).await;
    assert!(resp.is_none(), "notifications get no response");

    let forwarded = next_event(&mut rx).await;
    assert_eq!(forwarded["method"], "clientTask.changed");
    assert_eq!(forwarded["params"]["type"], "added");
    assert_eq!(forwarded["params"]["task"]["name"], "Music");

    // The host stores no mirror copy of UI-owned tasks.
    let listed = call(&ctx, "task.list", json!({})).await;
    assert!(listed["result"].as_array().unwrap().is_empty());

    let removal = json!({ "jsonrpc": "2.0", "method": "task.removed", "params": { "id": 1 } });
    assert!(dispatch_text(&removal.to_string(), &ctx).await.is_none());
    let forwarded = next_event(&mut rx).await;
    assert_eq!(forwarded["params"]["type"], "removed");
    assert_eq!(forwarded["params"]["id"], 1);
}

// ── Shutdown drain ───────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_pauses_surviving_active_tasks() {
    let ctx = ctx();
    let pauses = Arc::new(AtomicUsize::new(0));

    let counting_spec = |pauses: Arc<AtomicUsize>| {
        TaskSpec::new("Timer", Value::Null).on_pause(move || {
            pauses.fetch_add(1, Ordering::SeqCst);
        })
    };

    let first = ctx
        .tasks
        .create("com.lumen.timer", counting_spec(pauses.clone()))
        .unwrap();
    ctx.tasks
        .create("com.lumen.timer", counting_spec(pauses.clone()))
        .unwrap();
    // One task is already paused before shutdown; its hook must not rerun.
    assert!(ctx.tasks.pause(first.id));
    assert_eq!(pauses.load(Ordering::SeqCst), 1);

    ctx.tasks.shutdown();
    assert_eq!(
        pauses.load(Ordering::SeqCst),
        2,
        "only the surviving active task is paused by the drain"
    );
    assert_eq!(ctx.tasks.active_count(), 0);
}

// ── Full WebSocket round trip ────────────────────────────────────────────────

#[tokio::test]
async fn remote_handler_round_trips_over_websocket() {
    let ctx = Arc::new(AppContext::new(ShellConfig::default(), "secret".to_string()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(ipc::serve(listener, ctx.clone()));

    let client = Arc::new(ShellClient::connect(port, "secret").await.unwrap());
    let mut events = client.subscribe();

    let widgets = Arc::new(WidgetRegistry::new());
    let handler = RemoteTaskHandler::new("com.lumen.music", client.clone(), widgets);

    let snap = handler
        .create(TaskSpec::new("Music", json!({ "id": 7 })))
        .await
        .unwrap();
    assert_eq!(snap.id, 1);
    assert!(!snap.is_remote, "host-owned tasks are not remote");

    let change = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("task.changed must be pushed to the window")
        .unwrap();
    assert_eq!(change["method"], "task.changed");
    assert_eq!(change["params"]["type"], "added");

    assert_eq!(handler.list().await.len(), 1);
    assert!(handler.pause(snap.id).await);
    assert!(!handler.list().await[0].active);
    assert!(handler.resume(snap.id).await);
    assert!(handler.remove(snap.id).await);
    assert!(handler.list().await.is_empty());

    // Host tasks created over RPC carry no custom methods.
    let outcome = handler.call_method(1, "toggleMute", Vec::new()).await;
    assert_eq!(outcome["error"], "Method toggleMute not found on task 1");

    server.abort();
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let ctx = Arc::new(AppContext::new(ShellConfig::default(), "secret".to_string()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(ipc::serve(listener, ctx));

    assert!(
        ShellClient::connect(port, "wrong").await.is_err(),
        "auth handshake must fail with a bad token"
    );

    server.abort();
}

//! UI-side end of the control channel.
//!
//! `ShellClient` keeps one JSON-RPC WebSocket connection to the host.
//! Requests carry monotonically increasing ids and suspend the caller until
//! the matching response arrives; notifications are fire-and-forget; pushed
//! host notifications (`task.changed`, `clientTask.changed`) fan out to
//! subscribers. The channel preserves per-direction FIFO order, but two
//! independently issued requests race — callers needing strict before/after
//! semantics must await each call before issuing the next.

use anyhow::{bail, Context as _, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Value>>>;

pub struct ShellClient {
    out: mpsc::UnboundedSender<Message>,
    pending: Arc<PendingMap>,
    events: broadcast::Sender<Value>,
    next_id: AtomicU64,
}

impl ShellClient {
    /// Connect to the host on `port` and complete the auth handshake.
    pub async fn connect(port: u16, token: &str) -> Result<Self> {
        let url = format!("ws://127.0.0.1:{port}");
        let (ws, _) = tokio::time::timeout(CALL_TIMEOUT, connect_async(&url))
            .await
            .context("timed out connecting to host")?
            .context("failed to connect to host WebSocket")?;
        let (mut sink, mut stream) = ws.split();

        let (out, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(256);

        // Writer: drains the outbound queue in FIFO order.
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!(err = %e, "channel send failed");
                    break;
                }
            }
        });

        // Reader: correlate responses by id, fan notifications out.
        let reader_pending = pending.clone();
        let reader_events = events.clone();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let text = match msg {
                    Ok(Message::Text(t)) => t,
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => continue,
                };
                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                match value.get("id").and_then(Value::as_u64) {
                    Some(id) => {
                        let waiter = reader_pending
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&id);
                        if let Some(tx) = waiter {
                            let _ = tx.send(value);
                        }
                    }
                    // No id — a pushed host notification.
                    None => {
                        let _ = reader_events.send(value);
                    }
                }
            }
            debug!("channel reader stopped");
        });

        let client = Self {
            out,
            pending,
            events,
            next_id: AtomicU64::new(1),
        };

        client
            .invoke("shell.auth", json!({ "token": token }))
            .await
            .context("host rejected auth")?;
        Ok(client)
    }

    /// Request/response round trip: suspends until the host answers or the
    /// call times out.
    pub async fn invoke(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);

        let req = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if self.out.send(Message::Text(req.to_string())).is_err() {
            self.forget(id);
            bail!("channel unavailable");
        }

        let response = match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) => bail!("channel closed before {method} response"),
            Err(_) => {
                self.forget(id);
                bail!("timed out waiting for {method} response");
            }
        };

        if let Some(err) = response.get("error") {
            bail!("host RPC error: {err}");
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Fire-and-forget notification. Best-effort: a failed send is logged
    /// and dropped, never retried.
    pub fn notify(&self, method: &str, params: Value) {
        let msg = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        if self.out.send(Message::Text(msg.to_string())).is_err() {
            debug!(method = %method, "channel unavailable — notification dropped");
        }
    }

    /// Subscribe to pushed host notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.events.subscribe()
    }

    /// Connect, call one method, and drop the connection. For CLI commands.
    pub async fn call_once(port: u16, token: &str, method: &str, params: Value) -> Result<Value> {
        let client = Self::connect(port, token).await?;
        client.invoke(method, params).await
    }

    fn forget(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

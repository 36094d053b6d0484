//! Notification fan-out to connected shell windows.

use serde_json::Value;
use tokio::sync::broadcast;

/// Broadcasts JSON-RPC notification strings to every connected UI window.
///
/// Carries `task.changed` for host-owned task mutations and
/// `clientTask.changed` for forwarded UI-task events. Delivery is
/// best-effort and nothing is retried; a subscriber that lags past the
/// channel capacity loses the oldest events.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Send a JSON-RPC notification to all connected windows.
    pub fn broadcast(&self, method: &str, params: Value) {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        // No subscribers is fine — ignore the error.
        let _ = self
            .tx
            .send(serde_json::to_string(&notification).unwrap_or_default());
    }

    /// Subscribe to all broadcast notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Number of currently connected subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

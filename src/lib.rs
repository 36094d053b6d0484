//! Lumen Host — launcher shell background daemon and mini-app library.
//!
//! The host process owns the authoritative registry of host-owned
//! background tasks and serves it over a JSON-RPC WebSocket channel; the
//! UI process links this crate for the client end of the channel, its own
//! per-scheme task registries, and the mini-app controllers.

pub mod apps;
pub mod client;
pub mod config;
pub mod handler;
pub mod ipc;
pub mod tasks;
pub mod widgets;

// Re-export auth so main.rs can use lumend::auth directly.
pub use ipc::auth;

use std::sync::Arc;
use std::time::Instant;

use config::ShellConfig;
use ipc::event::EventBroadcaster;
use tasks::TaskService;
use widgets::WidgetRegistry;

/// Shared host state passed to every RPC handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ShellConfig>,
    pub broadcaster: Arc<EventBroadcaster>,
    /// Authoritative registry of host-owned tasks.
    pub tasks: Arc<TaskService>,
    /// Process-wide live-activity widget table.
    pub widgets: Arc<WidgetRegistry>,
    pub started_at: Instant,
    /// Local WebSocket auth token. Every connection must complete a
    /// `shell.auth` handshake before any other call. Empty disables auth
    /// (not recommended).
    pub auth_token: String,
}

impl AppContext {
    pub fn new(config: ShellConfig, auth_token: String) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let widgets = Arc::new(WidgetRegistry::new());
        let tasks = Arc::new(TaskService::new(widgets.clone(), broadcaster.clone()));
        Self {
            config: Arc::new(config),
            broadcaster,
            tasks,
            widgets,
            started_at: Instant::now(),
            auth_token,
        }
    }
}

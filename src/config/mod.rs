//! Host configuration: defaults, `config.toml`, and CLI/env overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

const DEFAULT_PORT: u16 = 4520;
const DEFAULT_LOG: &str = "info";

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_data_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".lumen")
}

/// Host configuration (`config.toml` in the data directory). CLI flags and
/// `LUMEND_*` environment variables override file values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// JSON-RPC WebSocket port, shared with the HTTP health endpoint.
    pub port: u16,
    /// Bind address (127.0.0.1 unless the shell UI runs on another host).
    pub bind_address: String,
    /// Data directory for the auth token and config.toml.
    pub data_dir: PathBuf,
    /// Default tracing filter.
    pub log: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: default_bind_address(),
            data_dir: default_data_dir(),
            log: DEFAULT_LOG.to_string(),
        }
    }
}

impl ShellConfig {
    /// Load `config.toml` from the data directory, falling back to defaults.
    /// A file that fails to parse is ignored with a warning rather than
    /// aborting the host.
    pub fn load(data_dir: Option<PathBuf>) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let path = data_dir.join("config.toml");
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => match toml::from_str::<ShellConfig>(&text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(path = %path.display(), err = %e, "could not parse config.toml — using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        // The directory we found the file in always wins over its contents.
        config.data_dir = data_dir;
        config
    }

    pub fn apply_overrides(
        &mut self,
        port: Option<u16>,
        bind_address: Option<String>,
        log: Option<String>,
    ) {
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(bind) = bind_address {
            self.bind_address = bind;
        }
        if let Some(log) = log {
            self.log = log;
        }
    }
}

//! Local auth token for the host's WebSocket port.

use anyhow::{Context as _, Result};
use std::path::Path;
use uuid::Uuid;

/// Return the auth token for this host instance.
///
/// On first call, generates a random 32-character hex token and writes it
/// to `{data_dir}/auth_token` with user-only permissions (mode 0600 on
/// Unix). On subsequent calls, reads and returns the existing token.
///
/// The token file is the only credential protecting the local WebSocket
/// port from other processes on the same machine; UI windows read it and
/// send it in the `shell.auth` handshake on every connect.
pub fn get_or_create_token(data_dir: &Path) -> Result<String> {
    let path = data_dir.join("auth_token");

    if path.exists() {
        let token = std::fs::read_to_string(&path)?.trim().to_string();
        if !token.is_empty() {
            return Ok(token);
        }
    }

    // UUID v4, hex without dashes = 32 chars.
    let token = Uuid::new_v4().to_string().replace('-', "");

    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&path, &token)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(token)
}

/// Read the auth token from a running host's data directory.
///
/// Errors if the file does not exist (host not yet started).
pub fn read_token(data_dir: &Path) -> Result<String> {
    let path = data_dir.join("auth_token");
    let token = std::fs::read_to_string(&path).with_context(|| {
        format!(
            "could not read auth token from {} — is the host running?",
            path.display()
        )
    })?;
    Ok(token.trim().to_owned())
}

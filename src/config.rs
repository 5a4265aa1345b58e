//! Application configuration
//!
//! `config.json` in the platform config directory. A missing file means
//! defaults; environment variables override whatever the file says:
//!
//! - `WINFW_BRIDGE_SCRIPT`: explicit bridge script path
//! - `WINFW_NETSH_COMMAND`: replacement for `netsh`
//! - `WINFW_RUN_MODE`: `user`, `apply` or `agent`

use crate::core::bridge::{BridgeConfig, RunMode};
use crate::core::error::{Error, Result};
use crate::invoker::DEFAULT_NETSH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_BRIDGE_SCRIPT: &str = "WINFW_BRIDGE_SCRIPT";
pub const ENV_NETSH_COMMAND: &str = "WINFW_NETSH_COMMAND";
pub const ENV_RUN_MODE: &str = "WINFW_RUN_MODE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default = "default_netsh")]
    pub netsh: String,
    /// Record every mutation in the audit log (on by default)
    #[serde(default = "default_true")]
    pub audit_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            netsh: default_netsh(),
            audit_enabled: true,
        }
    }
}

fn default_netsh() -> String {
    DEFAULT_NETSH.to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Applies environment overrides through a lookup function.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownMode` if the run mode override is not recognised.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(script) = lookup(ENV_BRIDGE_SCRIPT).filter(|s| !s.trim().is_empty()) {
            debug!("{ENV_BRIDGE_SCRIPT} override: {script}");
            self.bridge.script = Some(PathBuf::from(script));
        }
        if let Some(netsh) = lookup(ENV_NETSH_COMMAND).filter(|s| !s.trim().is_empty()) {
            debug!("{ENV_NETSH_COMMAND} override: {netsh}");
            self.netsh = netsh;
        }
        if let Some(mode) = lookup(ENV_RUN_MODE).filter(|s| !s.trim().is_empty()) {
            self.bridge.run_mode = RunMode::parse(&mode)?;
        }
        Ok(())
    }
}

/// Loads the config from `path` (or the default location), then applies
/// environment overrides.
///
/// # Errors
///
/// Returns `Error::Serialization` for an unreadable file and
/// `Error::UnknownMode` for a bad `WINFW_RUN_MODE`.
pub async fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(crate::utils::default_config_path);

    let mut config = match path {
        Some(path) => match tokio::fs::read_to_string(&path).await {
            Ok(json) => {
                debug!("Loaded config from {}", path.display());
                serde_json::from_str::<AppConfig>(&json)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => return Err(Error::Io(e)),
        },
        None => AppConfig::default(),
    };

    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

/// Saves the config to `path` using an atomic write pattern.
/// 1. Writes to a temporary file.
/// 2. Sets restrictive permissions (0o600).
/// 3. Atomically renames to the target path.
///
/// # Security
///
/// On Unix systems, files are created with mode 0o600 (user read/write only).
/// On Windows, files inherit directory permissions.
pub async fn save_config(config: &AppConfig, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600) // Set permissions BEFORE any data is written
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })
}

//! Mutation audit trail
//!
//! Each rule create, rule delete and `netsh` settings change is appended to
//! `audit.log` in the state directory as one JSON object per line. Failed
//! attempts are recorded too, with the error text.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// What kind of firewall mutation was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CreateRule,
    DeleteRule,
    SetSetting,
}

/// One line of the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// UTC time the mutation was attempted
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub event_type: EventType,

    /// `false` when the bridge or `netsh` reported an error
    pub success: bool,

    /// Rule name and argument vector, or scope, key and value
    pub details: serde_json::Value,

    pub error: Option<String>,
}

impl AuditEvent {
    /// Stamps an event with the current time
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }
}

/// Append-only JSON-lines log of firewall mutations
#[derive(Debug, Clone)]
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Opens `audit.log` under the platform state directory.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` when no state directory exists for this user.
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push("audit.log");

        Ok(Self { log_path })
    }

    /// Uses `path` instead of the state directory
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            log_path: path.as_ref().to_path_buf(),
        }
    }

    /// Appends `event` as a single line and syncs it to disk.
    ///
    /// # Errors
    ///
    /// Propagates open, write and sync failures.
    pub async fn log(&self, event: AuditEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await
    }

    /// Records an event, downgrading write failures to a warning.
    ///
    /// A broken audit log must not abort a reconciliation pass halfway through.
    pub async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }

    /// Up to `count` events, newest first. Lines that fail to parse are skipped.
    ///
    /// # Errors
    ///
    /// Propagates the read failure, including a missing log file.
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .take(count)
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        Ok(events)
    }
}

/// Builds the event for a rule create or delete
pub fn rule_event(event_type: EventType, name: &str, args: &[String], error: Option<String>) -> AuditEvent {
    AuditEvent::new(
        event_type,
        error.is_none(),
        serde_json::json!({
            "rule": name,
            "args": args,
        }),
        error,
    )
}

/// Builds the event for a profile or global setting change
pub fn setting_event(scope: &str, key: &str, value: &str, error: Option<String>) -> AuditEvent {
    AuditEvent::new(
        EventType::SetSetting,
        error.is_none(),
        serde_json::json!({
            "scope": scope,
            "key": key,
            "value": value,
        }),
        error,
    )
}

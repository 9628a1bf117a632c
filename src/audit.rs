//! Deployment journal
//!
//! Appends one JSON line per event to `<state_dir>/audit.log`:
//! `package.installed`, `package.uninstalled`, `units.purged`.

use crate::config::HostSettings;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Journal appending JSON lines; a no-op when disabled
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(settings: &HostSettings) -> Self {
        Self {
            path: settings.audit_log.clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append an event. IO failures are logged and the event dropped.
    pub async fn log(&self, event: &str, data: &serde_json::Value) {
        let Some(path) = &self.path else {
            return;
        };

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = append(path, &line).await {
            warn!("Failed to write audit log {}: {}", path.display(), e);
        }
    }
}

async fn append(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn journal(dir: &TempDir) -> AuditLog {
        let mut settings = HostSettings::rooted_at(dir.path());
        settings.audit_log = Some(dir.path().join("state/audit.log"));
        AuditLog::new(&settings)
    }

    #[tokio::test]
    async fn writes_json_line() {
        let dir = TempDir::new().unwrap();
        let audit = journal(&dir);

        audit
            .log(
                "package.installed",
                &serde_json::json!({"name": "orders", "instance_id": 3}),
            )
            .await;

        let content = tokio::fs::read_to_string(audit.path().unwrap()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();

        assert_eq!(parsed["event"], "package.installed");
        assert_eq!(parsed["data"]["name"], "orders");
        assert!(parsed["timestamp"].is_string());
    }

    #[tokio::test]
    async fn appends_multiple_lines() {
        let dir = TempDir::new().unwrap();
        let audit = journal(&dir);

        audit.log("units.purged", &serde_json::json!({"count": 0})).await;
        audit.log("package.uninstalled", &serde_json::json!({})).await;

        let content = tokio::fs::read_to_string(audit.path().unwrap()).await.unwrap();
        assert_eq!(content.trim().lines().count(), 2);
    }

    #[tokio::test]
    async fn disabled_journal_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::new(&HostSettings::rooted_at(dir.path()));

        audit.log("package.installed", &serde_json::json!({})).await;

        assert!(audit.path().is_none());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}

//! Audit trail for business state transitions
//!
//! Every event is emitted through `tracing` under the `audit` target and, when
//! `AUDIT_LOG_PATH` is set, appended to a JSONL file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::auth::AuthContext;

/// One audited state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    /// Dotted action name, e.g. `commit.approved`
    pub action: String,
    pub org_id: String,
    /// User who caused the change (empty for system actions)
    pub actor_id: String,
    /// Record kind and id the action applies to
    pub entity: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(action: &str, entity: &str, entity_id: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.to_string(),
            org_id: String::new(),
            actor_id: String::new(),
            entity: entity.to_string(),
            entity_id: entity_id.to_string(),
            detail: None,
        }
    }

    /// Attribute the event to a caller and their tenant
    pub fn by(mut self, ctx: &AuthContext) -> Self {
        self.org_id = ctx.org_id.clone();
        self.actor_id = ctx.user_id.clone();
        self
    }

    pub fn in_org(mut self, org_id: &str) -> Self {
        self.org_id = org_id.to_string();
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Audit logger shared by all services
#[derive(Clone, Default)]
pub struct AuditLogger {
    inner: Arc<Mutex<AuditLoggerInner>>,
}

#[derive(Default)]
struct AuditLoggerInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append events to the JSONL file at `path`
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        let mut inner = self.inner.lock().await;
        inner.writer = Some(BufWriter::new(file));
        inner.path = Some(path.clone());

        info!("Audit logging initialized to {}", path.display());
        Ok(())
    }

    pub async fn log(&self, event: AuditEvent) {
        info!(
            target: "audit",
            action = %event.action,
            org_id = %event.org_id,
            actor_id = %event.actor_id,
            entity = %event.entity,
            entity_id = %event.entity_id,
            "audit"
        );

        let mut inner = self.inner.lock().await;
        let Some(ref mut writer) = inner.writer else {
            return;
        };

        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        if let Err(e) = writeln!(writer, "{}", jsonl) {
            error!("Failed to write audit event: {}", e);
        }
        if let Err(e) = writer.flush() {
            error!("Failed to flush audit log: {}", e);
        }
    }

    /// Shorthand for a caller-attributed event
    pub async fn record(&self, ctx: &AuthContext, action: &str, entity: &str, entity_id: &str) {
        self.log(AuditEvent::new(action, entity, entity_id).by(ctx)).await;
    }

    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }
}

//! Audit trail boundary.
//!
//! The event store remains the transactional system of record; audit entries
//! derive from committed transitions, at-least-once.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use procflow_core::UserId;

/// One recorded audit entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_id: UserId,
    pub details: JsonValue,
    pub recorded_at: DateTime<Utc>,
}

/// Best-effort audit sink.
pub trait AuditRecorder: Send + Sync {
    fn log_event(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        actor_id: UserId,
        details: JsonValue,
    );
}

/// In-memory recorder for tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditRecorder {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditRecorder for InMemoryAuditRecorder {
    fn log_event(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        actor_id: UserId,
        details: JsonValue,
    ) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(AuditEntry {
                action: action.to_string(),
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
                actor_id,
                details,
                recorded_at: Utc::now(),
            });
        }
    }
}

/// Recorder that emits audit entries as structured log events.
#[derive(Debug, Default)]
pub struct TracingAuditRecorder;

impl AuditRecorder for TracingAuditRecorder {
    fn log_event(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        actor_id: UserId,
        details: JsonValue,
    ) {
        tracing::info!(
            action,
            entity_type,
            entity_id,
            actor_id = %actor_id,
            details = %details,
            "audit"
        );
    }
}

//! Audit events emitted by every state-changing inbox operation.
//!
//! Delivery is fire-and-forget: [`AuditSink::emit`] never fails and never
//! blocks the operation that produced the event.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "session.assigned")]
    SessionAssigned,
    #[serde(rename = "session.claimed")]
    SessionClaimed,
    #[serde(rename = "session.transferred")]
    SessionTransferred,
    #[serde(rename = "session.resolved")]
    SessionResolved,
    #[serde(rename = "session.reengaged")]
    SessionReengaged,
    #[serde(rename = "agent.presence_changed")]
    PresenceChanged,
    #[serde(rename = "team.config_changed")]
    TeamConfigChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SessionAssigned => "session.assigned",
            AuditAction::SessionClaimed => "session.claimed",
            AuditAction::SessionTransferred => "session.transferred",
            AuditAction::SessionResolved => "session.resolved",
            AuditAction::SessionReengaged => "session.reengaged",
            AuditAction::PresenceChanged => "agent.presence_changed",
            AuditAction::TeamConfigChanged => "team.config_changed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor_id: String,
    pub tenant_id: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        tenant_id: impl Into<String>,
        actor_id: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            action,
            actor_id: actor_id.into(),
            tenant_id: tenant_id.into(),
            resource_id: resource_id.into(),
            details: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Receiver of audit events
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Writes audit events as structured log lines on the `audit` target
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            target: "audit",
            action = %event.action,
            actor = %event.actor_id,
            tenant = %event.tenant_id,
            resource = %event.resource_id,
            details = %event.details,
            "📝 audit"
        );
    }
}

/// Fans audit events out to in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastAuditSink {
    sender: broadcast::Sender<AuditEvent>,
}

impl BroadcastAuditSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }
}

impl AuditSink for BroadcastAuditSink {
    fn emit(&self, event: AuditEvent) {
        // No subscribers is fine
        if self.sender.send(event).is_err() {
            trace!("audit event dropped: no subscribers");
        }
    }
}

//! Bulk transfer: best-effort fan-out of independent per-session transfers.
//!
//! Each session is moved with its own conditional write; a failure on one
//! session never rolls back the others.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::TransferConfig;
use crate::database::{DatabaseManager, TransferWrite};
use crate::error::{InboxError, Result};
use crate::integration::{AuditAction, AuditEvent, AuditSink};
use crate::team::TeamRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkTransferRequest {
    pub session_ids: Vec<String>,
    #[serde(default)]
    pub target_agent_id: Option<String>,
    #[serde(default)]
    pub target_team_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Per-session result of a transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOutcome {
    Transferred,
    NotFound,
    /// Resolved sessions are outside routing for good
    AlreadyResolved,
    /// The target agent had no free capacity at write time
    TargetAtCapacity,
    /// The session changed between read and write
    ConcurrentlyModified,
    /// Store error on this item
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTransferResult {
    pub session_id: String,
    pub outcome: TransferOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SessionTransferResult {
    pub fn is_success(&self) -> bool {
        self.outcome == TransferOutcome::Transferred
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkTransferResult {
    pub transferred: usize,
    pub failed: usize,
    pub results: Vec<SessionTransferResult>,
}

pub struct BulkTransferService {
    db: DatabaseManager,
    registry: Arc<TeamRegistry>,
    audit: Arc<dyn AuditSink>,
    policy: TransferConfig,
}

impl BulkTransferService {
    pub fn new(
        db: DatabaseManager,
        registry: Arc<TeamRegistry>,
        audit: Arc<dyn AuditSink>,
        policy: TransferConfig,
    ) -> Self {
        Self {
            db,
            registry,
            audit,
            policy,
        }
    }

    /// Validate the request as a whole; problems here reject the entire batch
    async fn validate(&self, tenant_id: &str, request: &BulkTransferRequest) -> Result<()> {
        if request.session_ids.is_empty() {
            return Err(InboxError::validation("session_ids cannot be empty"));
        }

        let reason_given = request.reason.as_deref().map_or(false, |r| !r.trim().is_empty());
        if self.policy.require_reason && !reason_given {
            return Err(InboxError::validation("a transfer reason is required"));
        }

        match (&request.target_agent_id, &request.target_team_id) {
            (None, None) => {
                return Err(InboxError::validation("a target agent or team is required"));
            }
            (agent, team) => {
                if let Some(team_id) = team {
                    self.registry.get_team(tenant_id, team_id).await?;
                }
                if let Some(agent_id) = agent {
                    let profile = self
                        .db
                        .get_agent(tenant_id, agent_id)
                        .await?
                        .ok_or_else(|| InboxError::not_found(format!("agent {}", agent_id)))?;
                    if !profile.active {
                        return Err(InboxError::validation(format!("agent {} is deactivated", agent_id)));
                    }
                    if let Some(team_id) = team {
                        let snapshot = self.registry.snapshot(tenant_id, team_id).await?;
                        if !snapshot.is_member(agent_id) {
                            return Err(InboxError::validation(format!(
                                "agent {} is not a member of team {}",
                                agent_id, team_id
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn bulk_transfer(
        &self,
        tenant_id: &str,
        actor_id: &str,
        request: &BulkTransferRequest,
    ) -> Result<BulkTransferResult> {
        self.validate(tenant_id, request).await?;

        let reason = request.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
        let mut seen = HashSet::new();
        let mut result = BulkTransferResult::default();

        for session_id in request.session_ids.iter().filter(|id| seen.insert(id.as_str())) {
            let attempt = self
                .db
                .transfer_session(TransferWrite {
                    tenant_id,
                    session_id,
                    to_agent_id: request.target_agent_id.as_deref(),
                    to_team_id: request.target_team_id.as_deref(),
                    reason,
                    transferred_by: actor_id,
                    now: Utc::now(),
                })
                .await;

            let item = match attempt {
                Ok(TransferOutcome::Transferred) => {
                    self.audit.emit(
                        AuditEvent::new(AuditAction::SessionTransferred, tenant_id, actor_id, session_id)
                            .with_details(json!({
                                "to_agent_id": request.target_agent_id,
                                "to_team_id": request.target_team_id,
                                "reason": reason,
                            })),
                    );
                    SessionTransferResult {
                        session_id: session_id.clone(),
                        outcome: TransferOutcome::Transferred,
                        message: None,
                    }
                }
                Ok(outcome) => {
                    warn!("Transfer of session {} skipped: {:?}", session_id, outcome);
                    SessionTransferResult {
                        session_id: session_id.clone(),
                        outcome,
                        message: None,
                    }
                }
                Err(e) => {
                    error!("Transfer of session {} failed: {}", session_id, e);
                    SessionTransferResult {
                        session_id: session_id.clone(),
                        outcome: TransferOutcome::Failed,
                        message: Some(e.to_string()),
                    }
                }
            };

            if item.is_success() {
                result.transferred += 1;
            } else {
                result.failed += 1;
            }
            result.results.push(item);
        }

        info!(
            "🔀 Bulk transfer by {}: {} transferred, {} not transferred",
            actor_id, result.transferred, result.failed
        );
        Ok(result)
    }
}

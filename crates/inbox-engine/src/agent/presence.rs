//! # Presence & Eligibility
//!
//! Agents change their own presence; the system forces them offline on
//! logout. Presence changes never touch sessions that are already assigned.
//!
//! An agent is a routing candidate for a team iff the profile is active and
//! `online`, its assigned-session count is below `max_concurrent_chats`, it is
//! a member of the team, and (only when the team enforces shifts) one of its
//! shifts covers the current instant.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::agent::types::{AgentProfile, AgentStatus, Eligibility, PresenceReason, DEFAULT_MAX_CONCURRENT_CHATS};
use crate::database::DatabaseManager;
use crate::error::{InboxError, Result};
use crate::integration::{AuditAction, AuditEvent, AuditSink};
use crate::team::TeamRegistry;

/// Actor id recorded for presence changes made by the system
pub const SYSTEM_ACTOR: &str = "system";

/// A routing candidate together with the chats it can still take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleAgent {
    pub agent_id: String,
    pub remaining_capacity: u32,
}

/// Decide eligibility from already-loaded facts
///
/// `on_shift` is `None` when the team does not enforce shifts.
pub fn evaluate_eligibility(
    profile: Option<&AgentProfile>,
    active_chats: u32,
    is_member: bool,
    on_shift: Option<bool>,
) -> Eligibility {
    let Some(profile) = profile else {
        return Eligibility::Inactive;
    };

    if !profile.active {
        Eligibility::Inactive
    } else if profile.status != AgentStatus::Online {
        Eligibility::NotOnline
    } else if active_chats >= profile.max_concurrent_chats {
        Eligibility::AtCapacity
    } else if !is_member {
        Eligibility::NotMember
    } else if on_shift == Some(false) {
        Eligibility::OutsideShift
    } else {
        Eligibility::Eligible
    }
}

pub struct PresenceManager {
    db: DatabaseManager,
    registry: Arc<TeamRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl PresenceManager {
    pub fn new(db: DatabaseManager, registry: Arc<TeamRegistry>, audit: Arc<dyn AuditSink>) -> Self {
        Self { db, registry, audit }
    }

    /// Grant agent capability (or update name/capacity of an existing agent)
    pub async fn upsert_agent(
        &self,
        tenant_id: &str,
        agent_id: &str,
        display_name: &str,
        max_concurrent_chats: Option<u32>,
    ) -> Result<AgentProfile> {
        let capacity = max_concurrent_chats.unwrap_or(DEFAULT_MAX_CONCURRENT_CHATS);
        if capacity == 0 {
            return Err(InboxError::validation("max_concurrent_chats must be positive"));
        }
        if agent_id.trim().is_empty() {
            return Err(InboxError::validation("agent id cannot be empty"));
        }

        let profile = self
            .db
            .upsert_agent(tenant_id, agent_id, display_name, capacity, Utc::now())
            .await?;
        info!("🧑‍💼 Agent {} registered (capacity {})", agent_id, capacity);
        Ok(profile)
    }

    /// Self-service presence change
    ///
    /// Without a reason the default label for `status` is used. A reason that
    /// does not fit the status (e.g. `busy` while not `online`) is rejected.
    pub async fn set_presence(
        &self,
        tenant_id: &str,
        agent_id: &str,
        status: AgentStatus,
        reason: Option<PresenceReason>,
        actor_id: &str,
    ) -> Result<AgentProfile> {
        let reason = reason.unwrap_or_else(|| PresenceReason::default_for(status));
        if !reason.is_compatible_with(status) {
            return Err(InboxError::validation(format!(
                "presence reason '{}' is not valid with status '{}'",
                reason, status
            )));
        }

        let previous = self.get_agent(tenant_id, agent_id).await?;
        if !previous.active {
            return Err(InboxError::conflict(format!("agent {} is deactivated", agent_id)));
        }

        if !self.db.update_presence(tenant_id, agent_id, status, reason, Utc::now()).await? {
            return Err(InboxError::not_found(format!("agent {}", agent_id)));
        }

        info!("🟢 Agent {} is now {} ({})", agent_id, status, reason);
        self.audit.emit(
            AuditEvent::new(AuditAction::PresenceChanged, tenant_id, actor_id, agent_id).with_details(json!({
                "from": { "status": previous.status, "reason": previous.presence_reason },
                "to": { "status": status, "reason": reason },
            })),
        );

        self.get_agent(tenant_id, agent_id).await
    }

    /// System path used on logout or session revocation
    pub async fn force_offline(&self, tenant_id: &str, agent_id: &str) -> Result<AgentProfile> {
        let previous = self.get_agent(tenant_id, agent_id).await?;
        self.db
            .update_presence(tenant_id, agent_id, AgentStatus::Offline, PresenceReason::Unavailable, Utc::now())
            .await?;

        info!("🔴 Agent {} forced offline", agent_id);
        self.audit.emit(
            AuditEvent::new(AuditAction::PresenceChanged, tenant_id, SYSTEM_ACTOR, agent_id).with_details(json!({
                "from": { "status": previous.status, "reason": previous.presence_reason },
                "to": { "status": AgentStatus::Offline, "reason": PresenceReason::Unavailable },
                "forced": true,
            })),
        );

        self.get_agent(tenant_id, agent_id).await
    }

    /// Revoke agent capability; the profile is kept for reporting
    pub async fn deactivate_agent(&self, tenant_id: &str, agent_id: &str, actor_id: &str) -> Result<()> {
        if !self.db.deactivate_agent(tenant_id, agent_id, Utc::now()).await? {
            return Err(InboxError::not_found(format!("agent {}", agent_id)));
        }

        info!("🚫 Agent {} deactivated", agent_id);
        self.audit.emit(
            AuditEvent::new(AuditAction::PresenceChanged, tenant_id, actor_id, agent_id)
                .with_details(json!({ "deactivated": true })),
        );
        Ok(())
    }

    pub async fn get_agent(&self, tenant_id: &str, agent_id: &str) -> Result<AgentProfile> {
        self.db
            .get_agent(tenant_id, agent_id)
            .await?
            .ok_or_else(|| InboxError::not_found(format!("agent {}", agent_id)))
    }

    pub async fn list_agents(&self, tenant_id: &str) -> Result<Vec<AgentProfile>> {
        self.db.list_agents(tenant_id).await
    }

    pub async fn active_chat_count(&self, tenant_id: &str, agent_id: &str) -> Result<u32> {
        self.get_agent(tenant_id, agent_id).await?;
        self.db.active_chat_count(agent_id).await
    }

    /// Eligibility of one agent for a team at `now`, with the failing rule
    pub async fn check_eligibility(
        &self,
        tenant_id: &str,
        agent_id: &str,
        team_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Eligibility> {
        let snapshot = self.registry.snapshot(tenant_id, team_id).await?;
        let profile = self.db.get_agent(tenant_id, agent_id).await?;
        let active_chats = self.db.active_chat_count(agent_id).await?;

        let on_shift = if snapshot.team.shift_enforcement {
            let on_duty = self.db.on_shift_agents(tenant_id, team_id, now).await?;
            Some(on_duty.iter().any(|u| u == agent_id))
        } else {
            None
        };

        Ok(evaluate_eligibility(
            profile.as_ref(),
            active_chats,
            snapshot.is_member(agent_id),
            on_shift,
        ))
    }

    pub async fn is_eligible(&self, tenant_id: &str, agent_id: &str, team_id: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.check_eligibility(tenant_id, agent_id, team_id, now).await?.is_eligible())
    }

    /// Eligible agents among `candidates`, in candidate order
    pub async fn eligible_agents(
        &self,
        tenant_id: &str,
        team_id: &str,
        candidates: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<EligibleAgent>> {
        let snapshot = self.registry.snapshot(tenant_id, team_id).await?;
        let profiles: HashMap<String, AgentProfile> = self
            .db
            .list_agents(tenant_id)
            .await?
            .into_iter()
            .map(|p| (p.agent_id.clone(), p))
            .collect();
        let counts = self.db.active_chat_counts(tenant_id).await?;
        let on_duty: Option<HashSet<String>> = if snapshot.team.shift_enforcement {
            Some(self.db.on_shift_agents(tenant_id, team_id, now).await?.into_iter().collect())
        } else {
            None
        };

        let mut eligible = Vec::new();
        for agent_id in candidates {
            let profile = profiles.get(agent_id);
            let active = counts.get(agent_id).copied().unwrap_or(0);
            let verdict = evaluate_eligibility(
                profile,
                active,
                snapshot.is_member(agent_id),
                on_duty.as_ref().map(|set| set.contains(agent_id)),
            );

            match (verdict, profile) {
                (Eligibility::Eligible, Some(profile)) => eligible.push(EligibleAgent {
                    agent_id: agent_id.clone(),
                    remaining_capacity: profile.max_concurrent_chats - active,
                }),
                (verdict, _) => debug!("Agent {} not eligible for team {}: {:?}", agent_id, team_id, verdict),
            }
        }

        Ok(eligible)
    }
}

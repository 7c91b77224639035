use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::agent::{evaluate_eligibility, Eligibility, PresenceManager};
use crate::assignment::{rotation_order, AssignmentSummary, ClaimOutcome};
use crate::config::AssignmentSettings;
use crate::database::{ClaimRequest, DatabaseManager};
use crate::error::{InboxError, Result};
use crate::integration::{AuditAction, AuditEvent, AuditSink};
use crate::session::SessionStatus;
use crate::team::{RoutingStrategy, TeamRegistry, TeamSnapshot};

pub struct AssignmentEngine {
    db: DatabaseManager,
    registry: Arc<TeamRegistry>,
    presence: Arc<PresenceManager>,
    audit: Arc<dyn AuditSink>,
    settings: AssignmentSettings,
}

impl AssignmentEngine {
    pub fn new(
        db: DatabaseManager,
        registry: Arc<TeamRegistry>,
        presence: Arc<PresenceManager>,
        audit: Arc<dyn AuditSink>,
        settings: AssignmentSettings,
    ) -> Self {
        Self {
            db,
            registry,
            presence,
            audit,
            settings,
        }
    }

    /// Assign queued sessions of one team, or of every team of the tenant
    ///
    /// Partial assignment is the normal case (more sessions than free
    /// capacity) and is reported through the count, not as an error.
    pub async fn assign_queue(&self, tenant_id: &str, team_id: Option<&str>, actor_id: &str) -> Result<AssignmentSummary> {
        let team_ids = match team_id {
            Some(team_id) => vec![team_id.to_string()],
            None => self
                .registry
                .list_teams(tenant_id)
                .await?
                .into_iter()
                .map(|t| t.team_id)
                .collect(),
        };

        let mut assigned = 0;
        for team_id in &team_ids {
            assigned += self.assign_team(tenant_id, team_id, actor_id).await?;
        }

        if assigned > 0 {
            info!("✅ Assigned {} session(s) for tenant {}", assigned, tenant_id);
        }
        Ok(AssignmentSummary { assigned })
    }

    async fn assign_team(&self, tenant_id: &str, team_id: &str, actor_id: &str) -> Result<usize> {
        let snapshot = self.registry.snapshot(tenant_id, team_id).await?;

        let Some(config) = snapshot.config.as_ref().filter(|c| c.is_automatic()) else {
            debug!("Automatic assignment disabled for team {}", team_id);
            return Ok(0);
        };

        let candidates = candidate_order(&snapshot, config.strategy, &config.settings.agent_ids);
        if candidates.is_empty() {
            debug!("Team {} has no routing candidates", team_id);
            return Ok(0);
        }

        let now = Utc::now();
        let mut remaining: HashMap<String, u32> = self
            .presence
            .eligible_agents(tenant_id, team_id, &candidates, now)
            .await?
            .into_iter()
            .map(|a| (a.agent_id, a.remaining_capacity))
            .collect();
        if remaining.is_empty() {
            debug!("No eligible agents for team {}", team_id);
            return Ok(0);
        }

        let queue = self
            .db
            .queue_snapshot(tenant_id, team_id, self.settings.max_sessions_per_pass)
            .await?;
        let mut cursor = self.db.rotation_cursor(team_id).await?;
        let mut assigned = 0;

        'sessions: for session in &queue {
            if remaining.values().all(|&r| r == 0) {
                debug!("Team {} has no free capacity left; {} session(s) stay queued", team_id, queue.len() - assigned);
                break;
            }

            for agent_id in rotation_order(&candidates, cursor.as_deref()) {
                if remaining.get(agent_id).copied().unwrap_or(0) == 0 {
                    continue;
                }

                let outcome = self
                    .db
                    .claim_session(ClaimRequest {
                        tenant_id,
                        session_id: &session.session_id,
                        agent_id,
                        expected_team_id: Some(team_id),
                        rotation_team_id: Some(team_id),
                        now: Utc::now(),
                    })
                    .await?;

                match outcome {
                    ClaimOutcome::Claimed { .. } => {
                        if let Some(r) = remaining.get_mut(agent_id) {
                            *r -= 1;
                        }
                        cursor = Some(agent_id.clone());
                        assigned += 1;

                        info!("📥 Session {} assigned to agent {} (team {})", session.session_id, agent_id, team_id);
                        self.audit.emit(
                            AuditEvent::new(AuditAction::SessionAssigned, tenant_id, actor_id, &session.session_id)
                                .with_details(json!({
                                    "agent_id": agent_id,
                                    "team_id": team_id,
                                    "strategy": config.strategy.as_str(),
                                })),
                        );
                        continue 'sessions;
                    }
                    ClaimOutcome::AlreadyClaimed => continue 'sessions,
                    ClaimOutcome::AgentUnavailable => {
                        warn!("Agent {} became unavailable during assignment pass", agent_id);
                        remaining.insert(agent_id.clone(), 0);
                    }
                }
            }
        }

        Ok(assigned)
    }

    /// Agent self-claim of one session
    ///
    /// Subject to the same eligibility rules as automatic assignment (team
    /// membership only when the session is queued to a team). Does not move
    /// the rotation cursor.
    pub async fn claim_session(&self, tenant_id: &str, session_id: &str, agent_id: &str) -> Result<ClaimOutcome> {
        let session = self
            .db
            .get_session(tenant_id, session_id)
            .await?
            .ok_or_else(|| InboxError::not_found(format!("session {}", session_id)))?;

        if session.status != SessionStatus::Unassigned {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let now = Utc::now();
        let eligibility = match session.assigned_team_id.as_deref() {
            Some(team_id) => self.presence.check_eligibility(tenant_id, agent_id, team_id, now).await?,
            None => {
                let profile = self.presence.get_agent(tenant_id, agent_id).await?;
                let active = self.db.active_chat_count(agent_id).await?;
                evaluate_eligibility(Some(&profile), active, true, None)
            }
        };

        match eligibility {
            Eligibility::Eligible => {}
            Eligibility::NotMember => {
                return Err(InboxError::forbidden(format!(
                    "agent {} is not a member of the session's team",
                    agent_id
                )));
            }
            Eligibility::Inactive => return Err(InboxError::not_found(format!("agent {}", agent_id))),
            other => {
                debug!("Agent {} cannot claim session {}: {:?}", agent_id, session_id, other);
                return Ok(ClaimOutcome::AgentUnavailable);
            }
        }

        let outcome = self
            .db
            .claim_session(ClaimRequest {
                tenant_id,
                session_id,
                agent_id,
                expected_team_id: session.assigned_team_id.as_deref(),
                rotation_team_id: None,
                now,
            })
            .await?;

        if outcome.is_claimed() {
            info!("🙋 Session {} claimed by agent {}", session_id, agent_id);
            self.audit.emit(
                AuditEvent::new(AuditAction::SessionClaimed, tenant_id, agent_id, session_id)
                    .with_details(json!({ "team_id": session.assigned_team_id })),
            );
        }
        Ok(outcome)
    }
}

/// Candidate agents of a team for a strategy, in rotation order
fn candidate_order(snapshot: &TeamSnapshot, strategy: RoutingStrategy, allow_list: &[String]) -> Vec<String> {
    match strategy {
        RoutingStrategy::RoundRobin => snapshot.member_ids(),
        RoutingStrategy::SpecificAgents => {
            let mut seen = std::collections::HashSet::new();
            allow_list
                .iter()
                .filter(|id| snapshot.is_member(id) && seen.insert(id.as_str()))
                .cloned()
                .collect()
        }
        RoutingStrategy::Manual => Vec::new(),
    }
}

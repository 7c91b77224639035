//! # Inbox API
//!
//! [`InboxApi`] is the exposed surface of the engine: the routing operations
//! (presence, assignment, stats, bulk transfer, re-engagement, resolution)
//! plus the management calls around them. Every call is scoped to the
//! caller's tenant and checked against the caller's permissions.
//!
//! [`http`] maps the same operations onto an axum router.

pub mod http;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::agent::{AgentProfile, AgentStatus, PresenceManager, PresenceReason};
use crate::assignment::{AssignmentEngine, AssignmentSummary, ClaimOutcome};
use crate::bulk::{
    BulkTransferRequest, BulkTransferResult, BulkTransferService, ExpiredCount, ExpirySelector, ReengageRequest,
    ReengagementResult, ReengagementService,
};
use crate::config::InboxConfig;
use crate::database::DatabaseManager;
use crate::error::{InboxError, Result};
use crate::integration::{Actor, AuditSink, MessageDispatcher, Permission};
use crate::queue::{QueueStatsAggregator, TeamQueueStats};
use crate::resolution::{Resolution, ResolutionWorkflow, ResolveOutcome, ResolveRequest, WrapUpForm};
use crate::session::{InboxSession, NewSession, SessionFilter, TransferRecord};
use crate::team::{AssignmentConfig, NewTeam, RoutingStrategy, Shift, StrategySettings, Team, TeamMember, TeamRegistry, TeamRole};

/// Facade over every inbox service
#[derive(Clone)]
pub struct InboxApi {
    db: DatabaseManager,
    registry: Arc<TeamRegistry>,
    presence: Arc<PresenceManager>,
    engine: Arc<AssignmentEngine>,
    stats: Arc<QueueStatsAggregator>,
    transfers: Arc<BulkTransferService>,
    reengagement: Arc<ReengagementService>,
    resolutions: Arc<ResolutionWorkflow>,
}

impl InboxApi {
    /// Wire every service over one store and one set of collaborators
    pub fn new(
        db: DatabaseManager,
        config: &InboxConfig,
        dispatcher: Arc<dyn MessageDispatcher>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let registry = Arc::new(TeamRegistry::new(db.clone(), &config.registry, audit.clone()));
        let presence = Arc::new(PresenceManager::new(db.clone(), registry.clone(), audit.clone()));
        let engine = Arc::new(AssignmentEngine::new(
            db.clone(),
            registry.clone(),
            presence.clone(),
            audit.clone(),
            config.assignment.clone(),
        ));
        let stats = Arc::new(QueueStatsAggregator::new(
            db.clone(),
            registry.clone(),
            presence.clone(),
            config.stats.clone(),
        ));
        let transfers = Arc::new(BulkTransferService::new(
            db.clone(),
            registry.clone(),
            audit.clone(),
            config.transfer.clone(),
        ));
        let reengagement = Arc::new(ReengagementService::new(
            db.clone(),
            dispatcher,
            audit.clone(),
            config.reengagement.clone(),
        ));
        let resolutions = Arc::new(ResolutionWorkflow::new(db.clone(), registry.clone(), audit));

        Self {
            db,
            registry,
            presence,
            engine,
            stats,
            transfers,
            reengagement,
            resolutions,
        }
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    pub fn engine(&self) -> &Arc<AssignmentEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<TeamRegistry> {
        &self.registry
    }

    // === Routing operations ===

    /// Change the caller's own presence
    pub async fn set_presence(
        &self,
        actor: &Actor,
        status: AgentStatus,
        reason: Option<PresenceReason>,
    ) -> Result<AgentProfile> {
        self.presence
            .set_presence(&actor.tenant_id, &actor.user_id, status, reason, &actor.user_id)
            .await
    }

    /// Run automatic assignment for one team, or every team of the tenant
    pub async fn assign_queue(&self, actor: &Actor, team_id: Option<&str>) -> Result<AssignmentSummary> {
        actor.require(Permission::TeamsManage)?;
        self.engine.assign_queue(&actor.tenant_id, team_id, &actor.user_id).await
    }

    pub async fn get_queue_stats(
        &self,
        actor: &Actor,
        team_ids: &[String],
        lookback_hours: Option<u32>,
    ) -> Result<Vec<TeamQueueStats>> {
        self.stats.get_queue_stats(&actor.tenant_id, team_ids, lookback_hours).await
    }

    /// The caller claims one session for themself
    pub async fn claim_session(&self, actor: &Actor, session_id: &str) -> Result<ClaimOutcome> {
        self.engine.claim_session(&actor.tenant_id, session_id, &actor.user_id).await
    }

    pub async fn bulk_transfer(&self, actor: &Actor, request: &BulkTransferRequest) -> Result<BulkTransferResult> {
        actor.require(Permission::SessionBulkTransfer)?;
        self.transfers.bulk_transfer(&actor.tenant_id, &actor.user_id, request).await
    }

    pub async fn get_expired_count(&self, actor: &Actor, selector: &ExpirySelector) -> Result<ExpiredCount> {
        actor.require(Permission::SessionReengage)?;
        self.reengagement.get_expired_count(&actor.tenant_id, selector).await
    }

    pub async fn bulk_reengage(&self, actor: &Actor, request: &ReengageRequest) -> Result<ReengagementResult> {
        actor.require(Permission::SessionReengage)?;
        self.reengagement.bulk_reengage(&actor.tenant_id, &actor.user_id, request).await
    }

    /// Resolve a session; supervisors (`teams.manage`) may close sessions
    /// assigned to other agents
    pub async fn resolve_session(
        &self,
        actor: &Actor,
        session_id: &str,
        request: ResolveRequest,
    ) -> Result<ResolveOutcome> {
        self.resolutions
            .resolve_session(
                &actor.tenant_id,
                &actor.user_id,
                actor.has(Permission::TeamsManage),
                session_id,
                request,
            )
            .await
    }

    // === Agents ===

    pub async fn upsert_agent(
        &self,
        actor: &Actor,
        agent_id: &str,
        display_name: &str,
        max_concurrent_chats: Option<u32>,
    ) -> Result<AgentProfile> {
        actor.require(Permission::TeamsManage)?;
        self.presence
            .upsert_agent(&actor.tenant_id, agent_id, display_name, max_concurrent_chats)
            .await
    }

    /// Identity-provider hook for logout and session revocation
    pub async fn force_offline(&self, tenant_id: &str, agent_id: &str) -> Result<AgentProfile> {
        self.presence.force_offline(tenant_id, agent_id).await
    }

    pub async fn deactivate_agent(&self, actor: &Actor, agent_id: &str) -> Result<()> {
        actor.require(Permission::TeamsManage)?;
        self.presence.deactivate_agent(&actor.tenant_id, agent_id, &actor.user_id).await
    }

    pub async fn get_agent(&self, actor: &Actor, agent_id: &str) -> Result<AgentProfile> {
        self.presence.get_agent(&actor.tenant_id, agent_id).await
    }

    pub async fn list_agents(&self, actor: &Actor) -> Result<Vec<AgentProfile>> {
        self.presence.list_agents(&actor.tenant_id).await
    }

    pub async fn active_chat_count(&self, actor: &Actor, agent_id: &str) -> Result<u32> {
        self.presence.active_chat_count(&actor.tenant_id, agent_id).await
    }

    // === Teams ===

    pub async fn create_team(&self, actor: &Actor, team: NewTeam) -> Result<Team> {
        actor.require(Permission::TeamsManage)?;
        self.registry.create_team(&actor.tenant_id, team, &actor.user_id).await
    }

    pub async fn get_team(&self, actor: &Actor, team_id: &str) -> Result<Team> {
        self.registry.get_team(&actor.tenant_id, team_id).await
    }

    pub async fn list_teams(&self, actor: &Actor) -> Result<Vec<Team>> {
        self.registry.list_teams(&actor.tenant_id).await
    }

    pub async fn add_member(&self, actor: &Actor, team_id: &str, user_id: &str, role: TeamRole) -> Result<TeamMember> {
        actor.require(Permission::TeamsManage)?;
        self.registry
            .add_member(&actor.tenant_id, team_id, user_id, role, &actor.user_id)
            .await
    }

    pub async fn remove_member(&self, actor: &Actor, team_id: &str, user_id: &str) -> Result<bool> {
        actor.require(Permission::TeamsManage)?;
        self.registry
            .remove_member(&actor.tenant_id, team_id, user_id, &actor.user_id)
            .await
    }

    pub async fn list_members(&self, actor: &Actor, team_id: &str) -> Result<Vec<TeamMember>> {
        self.registry.list_members(&actor.tenant_id, team_id).await
    }

    pub async fn set_assignment_config(
        &self,
        actor: &Actor,
        team_id: Option<&str>,
        enabled: bool,
        strategy: RoutingStrategy,
        settings: StrategySettings,
    ) -> Result<AssignmentConfig> {
        actor.require(Permission::TeamsManage)?;
        self.registry
            .set_assignment_config(&actor.tenant_id, team_id, enabled, strategy, settings, &actor.user_id)
            .await
    }

    pub async fn set_shift_enforcement(&self, actor: &Actor, team_id: &str, enforced: bool) -> Result<()> {
        actor.require(Permission::TeamsManage)?;
        self.registry
            .set_shift_enforcement(&actor.tenant_id, team_id, enforced, &actor.user_id)
            .await
    }

    pub async fn add_shift(
        &self,
        actor: &Actor,
        team_id: Option<&str>,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Shift> {
        actor.require(Permission::TeamsManage)?;
        self.registry.add_shift(&actor.tenant_id, team_id, user_id, start, end).await
    }

    pub async fn list_shifts(&self, actor: &Actor, user_id: &str) -> Result<Vec<Shift>> {
        self.registry.list_shifts(&actor.tenant_id, user_id).await
    }

    pub async fn set_wrap_up_form(&self, actor: &Actor, team_id: &str, form: WrapUpForm) -> Result<()> {
        actor.require(Permission::TeamsManage)?;
        self.resolutions
            .set_wrap_up_form(&actor.tenant_id, team_id, form, &actor.user_id)
            .await
    }

    pub async fn get_wrap_up_form(&self, actor: &Actor, team_id: &str) -> Result<Option<WrapUpForm>> {
        self.resolutions.get_wrap_up_form(&actor.tenant_id, team_id).await
    }

    pub async fn clear_wrap_up_form(&self, actor: &Actor, team_id: &str) -> Result<bool> {
        actor.require(Permission::TeamsManage)?;
        self.resolutions
            .clear_wrap_up_form(&actor.tenant_id, team_id, &actor.user_id)
            .await
    }

    // === Sessions ===

    /// Inbound contact event from a channel adapter
    pub async fn create_session(&self, tenant_id: &str, new: NewSession) -> Result<InboxSession> {
        new.validate()?;
        if let Some(team_id) = new.team_id.as_deref() {
            self.registry.get_team(tenant_id, team_id).await?;
        }

        let session = self.db.create_session(tenant_id, &new, Utc::now()).await?;
        info!(
            "💬 Session {} opened for contact {} on {} (team: {})",
            session.session_id,
            session.contact_id,
            session.channel,
            session.assigned_team_id.as_deref().unwrap_or("none")
        );
        Ok(session)
    }

    pub async fn record_inbound_message(&self, tenant_id: &str, session_id: &str, at: DateTime<Utc>) -> Result<()> {
        if !self.db.record_inbound_message(tenant_id, session_id, at).await? {
            return Err(InboxError::not_found(format!("session {}", session_id)));
        }
        Ok(())
    }

    pub async fn get_session(&self, actor: &Actor, session_id: &str) -> Result<InboxSession> {
        self.db
            .get_session(&actor.tenant_id, session_id)
            .await?
            .ok_or_else(|| InboxError::not_found(format!("session {}", session_id)))
    }

    pub async fn list_sessions(&self, actor: &Actor, filter: &SessionFilter) -> Result<Vec<InboxSession>> {
        self.db.list_sessions(&actor.tenant_id, filter).await
    }

    pub async fn list_transfers(&self, actor: &Actor, session_id: &str) -> Result<Vec<TransferRecord>> {
        self.get_session(actor, session_id).await?;
        self.db.list_transfers(&actor.tenant_id, session_id).await
    }

    pub async fn get_resolution(&self, actor: &Actor, session_id: &str) -> Result<Resolution> {
        self.resolutions.get_resolution(&actor.tenant_id, session_id).await
    }

    /// Survey response from the CSAT collaborator
    pub async fn record_csat(
        &self,
        tenant_id: &str,
        session_id: &str,
        score: u8,
        feedback: Option<&str>,
    ) -> Result<Resolution> {
        self.resolutions.record_csat(tenant_id, session_id, score, feedback).await
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.db.health_check().await
    }
}

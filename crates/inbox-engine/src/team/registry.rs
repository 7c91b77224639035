//! # Team Registry
//!
//! Teams, membership, assignment configuration and shifts. Routing reads
//! this data on every pass, so the registry keeps a short-lived snapshot per
//! team (team row, members in rotation order, effective assignment config).
//! Every write through the registry drops the affected snapshots; a write
//! made by another service instance is picked up once the TTL expires.
//!
//! The rotation cursor is *not* served from the snapshot: the assignment
//! engine reads it fresh from the store and advances it inside the claim
//! transaction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::database::DatabaseManager;
use crate::error::{InboxError, Result};
use crate::integration::{AuditAction, AuditEvent, AuditSink};
use crate::team::types::{
    AssignmentConfig, NewTeam, RoutingStrategy, Shift, StrategySettings, Team, TeamMember, TeamRole,
};

/// Cached routing view of one team
#[derive(Debug, Clone)]
pub struct TeamSnapshot {
    pub team: Team,
    /// Ordered by user id
    pub members: Vec<TeamMember>,
    /// Team-scoped config, else the tenant-wide one
    pub config: Option<AssignmentConfig>,
}

impl TeamSnapshot {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.user_id.clone()).collect()
    }
}

struct CachedSnapshot {
    loaded_at: Instant,
    snapshot: Arc<TeamSnapshot>,
}

pub struct TeamRegistry {
    db: DatabaseManager,
    audit: Arc<dyn AuditSink>,
    ttl: Duration,
    /// Keyed by (tenant, team)
    cache: DashMap<(String, String), CachedSnapshot>,
}

impl TeamRegistry {
    pub fn new(db: DatabaseManager, config: &RegistryConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            db,
            audit,
            ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: DashMap::new(),
        }
    }

    pub async fn create_team(&self, tenant_id: &str, team: NewTeam, actor_id: &str) -> Result<Team> {
        if team.name.trim().is_empty() {
            return Err(InboxError::validation("team name cannot be empty"));
        }

        let created = self.db.create_team(tenant_id, &team, Utc::now()).await?;
        info!("👥 Team '{}' created ({})", created.name, created.team_id);

        self.audit.emit(
            AuditEvent::new(AuditAction::TeamConfigChanged, tenant_id, actor_id, &created.team_id)
                .with_details(json!({ "change": "team_created", "name": created.name })),
        );
        Ok(created)
    }

    /// Team of a tenant; teams of other tenants are reported as not found
    pub async fn get_team(&self, tenant_id: &str, team_id: &str) -> Result<Team> {
        self.db
            .get_team(tenant_id, team_id)
            .await?
            .ok_or_else(|| InboxError::not_found(format!("team {}", team_id)))
    }

    pub async fn list_teams(&self, tenant_id: &str) -> Result<Vec<Team>> {
        self.db.list_teams(tenant_id).await
    }

    pub async fn add_member(
        &self,
        tenant_id: &str,
        team_id: &str,
        user_id: &str,
        role: TeamRole,
        actor_id: &str,
    ) -> Result<TeamMember> {
        self.get_team(tenant_id, team_id).await?;
        let member = self.db.add_team_member(team_id, user_id, role, Utc::now()).await?;
        self.invalidate(tenant_id, team_id);

        debug!("User {} joined team {} as {}", user_id, team_id, role.as_str());
        self.audit.emit(
            AuditEvent::new(AuditAction::TeamConfigChanged, tenant_id, actor_id, team_id)
                .with_details(json!({ "change": "member_added", "user_id": user_id, "role": role.as_str() })),
        );
        Ok(member)
    }

    pub async fn remove_member(&self, tenant_id: &str, team_id: &str, user_id: &str, actor_id: &str) -> Result<bool> {
        self.get_team(tenant_id, team_id).await?;
        let removed = self.db.remove_team_member(team_id, user_id).await?;
        self.invalidate(tenant_id, team_id);

        if removed {
            self.audit.emit(
                AuditEvent::new(AuditAction::TeamConfigChanged, tenant_id, actor_id, team_id)
                    .with_details(json!({ "change": "member_removed", "user_id": user_id })),
            );
        }
        Ok(removed)
    }

    pub async fn list_members(&self, tenant_id: &str, team_id: &str) -> Result<Vec<TeamMember>> {
        Ok(self.snapshot(tenant_id, team_id).await?.members.clone())
    }

    /// Write the assignment configuration of a team, or the tenant-wide one
    /// when `team_id` is `None`
    ///
    /// A team-scoped write also records the strategy on the team row.
    pub async fn set_assignment_config(
        &self,
        tenant_id: &str,
        team_id: Option<&str>,
        enabled: bool,
        strategy: RoutingStrategy,
        settings: StrategySettings,
        actor_id: &str,
    ) -> Result<AssignmentConfig> {
        if strategy == RoutingStrategy::SpecificAgents && settings.agent_ids.is_empty() {
            return Err(InboxError::validation("specific_agents strategy needs a non-empty agent_ids list"));
        }

        if let Some(team_id) = team_id {
            let team = self.get_team(tenant_id, team_id).await?;
            self.db
                .update_team_routing(tenant_id, team_id, strategy, team.shift_enforcement)
                .await?;
        }

        let config = self
            .db
            .upsert_assignment_config(tenant_id, team_id, enabled, strategy, &settings, Utc::now())
            .await?;

        match team_id {
            Some(team_id) => self.invalidate(tenant_id, team_id),
            None => self.invalidate_tenant(tenant_id),
        }

        info!(
            "⚙️ Assignment config for {} set to {} (enabled: {})",
            team_id.unwrap_or("tenant default"),
            strategy,
            enabled
        );
        self.audit.emit(
            AuditEvent::new(AuditAction::TeamConfigChanged, tenant_id, actor_id, team_id.unwrap_or("*"))
                .with_details(json!({
                    "change": "assignment_config",
                    "enabled": enabled,
                    "strategy": strategy.as_str(),
                })),
        );
        Ok(config)
    }

    /// Turn the shift gate of a team on or off
    pub async fn set_shift_enforcement(&self, tenant_id: &str, team_id: &str, enforced: bool, actor_id: &str) -> Result<()> {
        let team = self.get_team(tenant_id, team_id).await?;
        self.db
            .update_team_routing(tenant_id, team_id, team.routing_strategy, enforced)
            .await?;
        self.invalidate(tenant_id, team_id);

        self.audit.emit(
            AuditEvent::new(AuditAction::TeamConfigChanged, tenant_id, actor_id, team_id)
                .with_details(json!({ "change": "shift_enforcement", "enabled": enforced })),
        );
        Ok(())
    }

    /// Declare a shift; `team_id = None` puts the agent on duty for every team
    pub async fn add_shift(
        &self,
        tenant_id: &str,
        team_id: Option<&str>,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Shift> {
        if let Some(team_id) = team_id {
            self.get_team(tenant_id, team_id).await?;
        }
        self.db.add_shift(tenant_id, team_id, user_id, start, end).await
    }

    pub async fn list_shifts(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Shift>> {
        self.db.list_shifts(tenant_id, user_id).await
    }

    /// Routing view of a team, served from cache while fresh
    pub async fn snapshot(&self, tenant_id: &str, team_id: &str) -> Result<Arc<TeamSnapshot>> {
        let key = (tenant_id.to_string(), team_id.to_string());

        if let Some(cached) = self.cache.get(&key) {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.snapshot.clone());
            }
        }

        let team = self.get_team(tenant_id, team_id).await?;
        let members = self.db.list_team_members(team_id).await?;
        let config = self.db.effective_assignment_config(tenant_id, team_id).await?;
        let snapshot = Arc::new(TeamSnapshot { team, members, config });

        if !self.ttl.is_zero() {
            self.cache.insert(
                key,
                CachedSnapshot {
                    loaded_at: Instant::now(),
                    snapshot: snapshot.clone(),
                },
            );
        }
        Ok(snapshot)
    }

    pub fn invalidate(&self, tenant_id: &str, team_id: &str) {
        self.cache.remove(&(tenant_id.to_string(), team_id.to_string()));
    }

    pub fn invalidate_tenant(&self, tenant_id: &str) {
        self.cache.retain(|(tenant, _), _| tenant != tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::TracingAuditSink;

    async fn registry(ttl_secs: u64) -> TeamRegistry {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        TeamRegistry::new(db, &RegistryConfig { cache_ttl_secs: ttl_secs }, Arc::new(TracingAuditSink))
    }

    fn team(name: &str) -> NewTeam {
        NewTeam {
            name: name.into(),
            description: None,
            routing_strategy: RoutingStrategy::RoundRobin,
            shift_enforcement: false,
        }
    }

    #[tokio::test]
    async fn test_writes_invalidate_cached_snapshot() {
        let registry = registry(300).await;
        let support = registry.create_team("t1", team("Support"), "admin").await.unwrap();

        let before = registry.snapshot("t1", &support.team_id).await.unwrap();
        assert!(before.members.is_empty());
        assert!(before.config.is_none());

        registry.add_member("t1", &support.team_id, "agent-1", TeamRole::Member, "admin").await.unwrap();
        registry
            .set_assignment_config("t1", None, true, RoutingStrategy::RoundRobin, StrategySettings::default(), "admin")
            .await
            .unwrap();

        let after = registry.snapshot("t1", &support.team_id).await.unwrap();
        assert!(after.is_member("agent-1"));
        assert!(after.config.as_ref().unwrap().is_automatic());
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_see_team() {
        let registry = registry(5).await;
        let support = registry.create_team("t1", team("Support"), "admin").await.unwrap();

        let err = registry.snapshot("t2", &support.team_id).await.unwrap_err();
        assert!(matches!(err, InboxError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_specific_agents_requires_allow_list() {
        let registry = registry(5).await;
        let support = registry.create_team("t1", team("Support"), "admin").await.unwrap();

        let err = registry
            .set_assignment_config(
                "t1",
                Some(&support.team_id),
                true,
                RoutingStrategy::SpecificAgents,
                StrategySettings::default(),
                "admin",
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}

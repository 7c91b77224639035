//! Presence store: agent profiles and live chat counts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::{parse_column, DatabaseManager};
use crate::agent::{AgentProfile, AgentStatus, PresenceReason};
use crate::error::{InboxError, Result};

const AGENT_COLUMNS: &str = "agent_id, tenant_id, display_name, status, presence_reason, \
     max_concurrent_chats, active, created_at, updated_at";

impl AgentProfile {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let reason: String = row.try_get("presence_reason")?;
        let max_chats: i64 = row.try_get("max_concurrent_chats")?;

        Ok(AgentProfile {
            agent_id: row.try_get("agent_id")?,
            tenant_id: row.try_get("tenant_id")?,
            display_name: row.try_get("display_name")?,
            status: parse_column(&status, "agents.status")?,
            presence_reason: parse_column(&reason, "agents.presence_reason")?,
            max_concurrent_chats: u32::try_from(max_chats)
                .map_err(|_| InboxError::database(format!("invalid capacity {}", max_chats)))?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl DatabaseManager {
    /// Create an agent or update its name and capacity
    ///
    /// Presence of an existing agent is left untouched; a new agent starts
    /// `offline`/`unavailable`. Re-granting capability reactivates the agent.
    pub async fn upsert_agent(
        &self,
        tenant_id: &str,
        agent_id: &str,
        display_name: &str,
        max_concurrent_chats: u32,
        now: DateTime<Utc>,
    ) -> Result<AgentProfile> {
        let result = sqlx::query(
            "INSERT INTO agents (agent_id, tenant_id, display_name, status, presence_reason,
                                 max_concurrent_chats, active, created_at, updated_at)
             VALUES (?, ?, ?, 'offline', 'unavailable', ?, 1, ?, ?)
             ON CONFLICT(agent_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 max_concurrent_chats = excluded.max_concurrent_chats,
                 active = 1,
                 updated_at = excluded.updated_at
             WHERE agents.tenant_id = excluded.tenant_id",
        )
        .bind(agent_id)
        .bind(tenant_id)
        .bind(display_name)
        .bind(i64::from(max_concurrent_chats))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(InboxError::conflict(format!(
                "agent {} belongs to another tenant",
                agent_id
            )));
        }

        debug!("Agent {} upserted for tenant {}", agent_id, tenant_id);
        self.get_agent(tenant_id, agent_id)
            .await?
            .ok_or_else(|| InboxError::not_found(format!("agent {}", agent_id)))
    }

    /// Get an agent of a tenant
    pub async fn get_agent(&self, tenant_id: &str, agent_id: &str) -> Result<Option<AgentProfile>> {
        let sql = format!("SELECT {} FROM agents WHERE agent_id = ? AND tenant_id = ?", AGENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(agent_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(AgentProfile::from_row).transpose()
    }

    /// List a tenant's agents ordered by id
    pub async fn list_agents(&self, tenant_id: &str) -> Result<Vec<AgentProfile>> {
        let sql = format!("SELECT {} FROM agents WHERE tenant_id = ? ORDER BY agent_id", AGENT_COLUMNS);
        let rows = sqlx::query(&sql).bind(tenant_id).fetch_all(&self.pool).await?;

        rows.iter().map(AgentProfile::from_row).collect()
    }

    /// Persist a presence change; returns false when the agent does not exist
    pub async fn update_presence(
        &self,
        tenant_id: &str,
        agent_id: &str,
        status: AgentStatus,
        reason: PresenceReason,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agents SET status = ?, presence_reason = ?, updated_at = ?
             WHERE agent_id = ? AND tenant_id = ?",
        )
        .bind(status.as_str())
        .bind(reason.as_str())
        .bind(now)
        .bind(agent_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        debug!("Agent {} presence updated to {}/{}", agent_id, status, reason);
        Ok(result.rows_affected() > 0)
    }

    /// Soft-delete an agent; it stays offline and is never routed to again
    pub async fn deactivate_agent(&self, tenant_id: &str, agent_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agents SET active = 0, status = 'offline', presence_reason = 'unavailable', updated_at = ?
             WHERE agent_id = ? AND tenant_id = ?",
        )
        .bind(now)
        .bind(agent_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of sessions currently assigned to an agent
    pub async fn active_chat_count(&self, agent_id: &str) -> Result<u32> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sessions WHERE assigned_agent_id = ? AND status = 'assigned'",
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Assigned-session counts for every agent of a tenant that has any
    pub async fn active_chat_counts(&self, tenant_id: &str) -> Result<HashMap<String, u32>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT assigned_agent_id, COUNT(*) FROM sessions
             WHERE tenant_id = ? AND status = 'assigned' AND assigned_agent_id IS NOT NULL
             GROUP BY assigned_agent_id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(agent, count)| (agent, u32::try_from(count).unwrap_or(u32::MAX)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_agent_starts_offline() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let agent = db.upsert_agent("t1", "agent-1", "Ada", 2, Utc::now()).await.unwrap();

        assert_eq!(agent.status, AgentStatus::Offline);
        assert_eq!(agent.presence_reason, PresenceReason::Unavailable);
        assert_eq!(agent.max_concurrent_chats, 2);
        assert!(agent.active);
    }

    #[tokio::test]
    async fn test_upsert_keeps_presence_and_tenant() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        db.upsert_agent("t1", "agent-1", "Ada", 2, Utc::now()).await.unwrap();
        db.update_presence("t1", "agent-1", AgentStatus::Online, PresenceReason::Available, Utc::now())
            .await
            .unwrap();

        let renamed = db.upsert_agent("t1", "agent-1", "Ada L.", 4, Utc::now()).await.unwrap();
        assert_eq!(renamed.status, AgentStatus::Online);
        assert_eq!(renamed.display_name, "Ada L.");

        let err = db.upsert_agent("t2", "agent-1", "Imposter", 1, Utc::now()).await.unwrap_err();
        assert!(matches!(err, InboxError::Conflict(_)));
        assert!(db.get_agent("t2", "agent-1").await.unwrap().is_none());
    }
}

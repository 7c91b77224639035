//! Session store: intake, the atomic claim, transfers and read projections.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{parse_column, DatabaseManager};
use crate::assignment::ClaimOutcome;
use crate::bulk::TransferOutcome;
use crate::error::Result;
use crate::session::{InboxSession, NewSession, SessionFilter, SessionStatus, TransferRecord};

const SESSION_COLUMNS: &str = "session_id, tenant_id, contact_id, contact_name, channel, status, \
     assigned_agent_id, assigned_team_id, priority, context, created_at, assigned_at, resolved_at, \
     last_message_at, version";

fn session_from_row(row: &SqliteRow) -> Result<InboxSession> {
    let status: String = row.try_get("status")?;
    Ok(InboxSession {
        session_id: row.try_get("session_id")?,
        tenant_id: row.try_get("tenant_id")?,
        contact_id: row.try_get("contact_id")?,
        contact_name: row.try_get("contact_name")?,
        channel: row.try_get("channel")?,
        status: parse_column(&status, "sessions.status")?,
        assigned_agent_id: row.try_get("assigned_agent_id")?,
        assigned_team_id: row.try_get("assigned_team_id")?,
        priority: row.try_get("priority")?,
        context: row.try_get("context")?,
        created_at: row.try_get("created_at")?,
        assigned_at: row.try_get("assigned_at")?,
        resolved_at: row.try_get("resolved_at")?,
        last_message_at: row.try_get("last_message_at")?,
        version: row.try_get("version")?,
    })
}

fn transfer_from_row(row: &SqliteRow) -> Result<TransferRecord> {
    Ok(TransferRecord {
        transfer_id: row.try_get("transfer_id")?,
        session_id: row.try_get("session_id")?,
        from_agent_id: row.try_get("from_agent_id")?,
        from_team_id: row.try_get("from_team_id")?,
        to_agent_id: row.try_get("to_agent_id")?,
        to_team_id: row.try_get("to_team_id")?,
        reason: row.try_get("reason")?,
        transferred_by: row.try_get("transferred_by")?,
        transferred_at: row.try_get("transferred_at")?,
    })
}

/// Parameters of one atomic claim
#[derive(Debug, Clone, Copy)]
pub struct ClaimRequest<'a> {
    pub tenant_id: &'a str,
    pub session_id: &'a str,
    pub agent_id: &'a str,
    /// Team the session was queued to when it was read
    pub expected_team_id: Option<&'a str>,
    /// Team whose rotation cursor moves to `agent_id` on success
    pub rotation_team_id: Option<&'a str>,
    pub now: DateTime<Utc>,
}

/// Parameters of one transfer
#[derive(Debug, Clone, Copy)]
pub struct TransferWrite<'a> {
    pub tenant_id: &'a str,
    pub session_id: &'a str,
    pub to_agent_id: Option<&'a str>,
    pub to_team_id: Option<&'a str>,
    pub reason: Option<&'a str>,
    pub transferred_by: &'a str,
    pub now: DateTime<Utc>,
}

impl DatabaseManager {
    /// Open a session for an inbound contact; it enters `unassigned`
    pub async fn create_session(&self, tenant_id: &str, new: &NewSession, now: DateTime<Utc>) -> Result<InboxSession> {
        let session_id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO sessions (session_id, tenant_id, contact_id, contact_name, channel, status,
                                   assigned_team_id, priority, context, created_at, last_message_at, version)
             VALUES (?, ?, ?, ?, ?, 'unassigned', ?, ?, ?, ?, ?, 0)",
        )
        .bind(&session_id)
        .bind(tenant_id)
        .bind(&new.contact_id)
        .bind(&new.contact_name)
        .bind(&new.channel)
        .bind(&new.team_id)
        .bind(new.priority)
        .bind(&new.context)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("Session {} created for contact {} on {}", session_id, new.contact_id, new.channel);
        Ok(InboxSession {
            session_id,
            tenant_id: tenant_id.to_string(),
            contact_id: new.contact_id.clone(),
            contact_name: new.contact_name.clone(),
            channel: new.channel.clone(),
            status: SessionStatus::Unassigned,
            assigned_agent_id: None,
            assigned_team_id: new.team_id.clone(),
            priority: new.priority,
            context: new.context.clone(),
            created_at: now,
            assigned_at: None,
            resolved_at: None,
            last_message_at: now,
            version: 0,
        })
    }

    pub async fn get_session(&self, tenant_id: &str, session_id: &str) -> Result<Option<InboxSession>> {
        let sql = format!("SELECT {} FROM sessions WHERE session_id = ? AND tenant_id = ?", SESSION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(session_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    /// List sessions, most recently active first
    pub async fn list_sessions(&self, tenant_id: &str, filter: &SessionFilter) -> Result<Vec<InboxSession>> {
        let sql = format!(
            "SELECT {} FROM sessions
             WHERE tenant_id = ?
               AND (? IS NULL OR status = ?)
               AND (? IS NULL OR assigned_team_id = ?)
               AND (? IS NULL OR assigned_agent_id = ?)
             ORDER BY last_message_at DESC, session_id
             LIMIT ?",
            SESSION_COLUMNS
        );
        let status = filter.status.map(|s| s.as_str());
        let limit = filter.limit.map(i64::from).unwrap_or(-1);

        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(status)
            .bind(status)
            .bind(&filter.team_id)
            .bind(&filter.team_id)
            .bind(&filter.agent_id)
            .bind(&filter.agent_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(session_from_row).collect()
    }

    /// Bump `last_message_at`; never moves it backwards
    pub async fn record_inbound_message(&self, tenant_id: &str, session_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET last_message_at = MAX(last_message_at, ?)
             WHERE session_id = ? AND tenant_id = ?",
        )
        .bind(at)
        .bind(session_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// A team's queue in processing order: highest priority, then oldest activity
    pub async fn queue_snapshot(&self, tenant_id: &str, team_id: &str, limit: usize) -> Result<Vec<InboxSession>> {
        let sql = format!(
            "SELECT {} FROM sessions
             WHERE tenant_id = ? AND assigned_team_id = ? AND status = 'unassigned'
             ORDER BY priority DESC, last_message_at ASC, session_id ASC
             LIMIT ?",
            SESSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(team_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(session_from_row).collect()
    }

    /// Atomically claim an unassigned session for an agent
    ///
    /// The claim succeeds only if, at write time, the session is still
    /// unassigned in the team it was read from, and the agent is active,
    /// online and below capacity. On success the team's rotation cursor is
    /// advanced in the same transaction.
    pub async fn claim_session(&self, claim: ClaimRequest<'_>) -> Result<ClaimOutcome> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE sessions
             SET status = 'assigned', assigned_agent_id = ?, assigned_at = ?, version = version + 1
             WHERE session_id = ? AND tenant_id = ? AND status = 'unassigned'
               AND assigned_team_id IS ?
               AND (SELECT COUNT(*) FROM sessions WHERE assigned_agent_id = ? AND status = 'assigned')
                   < (SELECT max_concurrent_chats FROM agents
                      WHERE agent_id = ? AND tenant_id = ? AND active = 1 AND status = 'online')",
        )
        .bind(claim.agent_id)
        .bind(claim.now)
        .bind(claim.session_id)
        .bind(claim.tenant_id)
        .bind(claim.expected_team_id)
        .bind(claim.agent_id)
        .bind(claim.agent_id)
        .bind(claim.tenant_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return self.classify_lost_claim(claim).await;
        }

        if let Some(team_id) = claim.rotation_team_id {
            sqlx::query("UPDATE teams SET rotation_cursor = ? WHERE team_id = ? AND tenant_id = ?")
                .bind(claim.agent_id)
                .bind(team_id)
                .bind(claim.tenant_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Session {} claimed by agent {}", claim.session_id, claim.agent_id);
        Ok(ClaimOutcome::Claimed {
            agent_id: claim.agent_id.to_string(),
        })
    }

    async fn classify_lost_claim(&self, claim: ClaimRequest<'_>) -> Result<ClaimOutcome> {
        let current = self.get_session(claim.tenant_id, claim.session_id).await?;
        let session_moved = match &current {
            Some(s) => s.status != SessionStatus::Unassigned || s.assigned_team_id.as_deref() != claim.expected_team_id,
            None => true,
        };

        if session_moved {
            warn!("Session {} was handled concurrently; claim by {} is a no-op", claim.session_id, claim.agent_id);
            Ok(ClaimOutcome::AlreadyClaimed)
        } else {
            debug!("Agent {} cannot take session {} (offline or at capacity)", claim.agent_id, claim.session_id);
            Ok(ClaimOutcome::AgentUnavailable)
        }
    }

    /// Move a session that is not resolved to a new agent and/or team
    ///
    /// With an agent the session becomes `assigned` (the agent must be active
    /// and below capacity). With only a team it goes back to `unassigned`,
    /// queued to that team. The precondition is the row version read just
    /// before the write, and the transfer log row commits with the change.
    pub async fn transfer_session(&self, transfer: TransferWrite<'_>) -> Result<TransferOutcome> {
        let Some(before) = self.get_session(transfer.tenant_id, transfer.session_id).await? else {
            return Ok(TransferOutcome::NotFound);
        };
        if before.is_resolved() {
            return Ok(TransferOutcome::AlreadyResolved);
        }

        let mut tx = self.pool.begin().await?;

        let result = match transfer.to_agent_id {
            Some(agent_id) => {
                sqlx::query(
                    "UPDATE sessions
                     SET status = 'assigned', assigned_agent_id = ?,
                         assigned_team_id = COALESCE(?, assigned_team_id),
                         assigned_at = COALESCE(assigned_at, ?), version = version + 1
                     WHERE session_id = ? AND tenant_id = ? AND version = ? AND status <> 'resolved'
                       AND (SELECT COUNT(*) FROM sessions
                            WHERE assigned_agent_id = ? AND status = 'assigned' AND session_id <> ?)
                           < (SELECT max_concurrent_chats FROM agents
                              WHERE agent_id = ? AND tenant_id = ? AND active = 1)",
                )
                .bind(agent_id)
                .bind(transfer.to_team_id)
                .bind(transfer.now)
                .bind(transfer.session_id)
                .bind(transfer.tenant_id)
                .bind(before.version)
                .bind(agent_id)
                .bind(transfer.session_id)
                .bind(agent_id)
                .bind(transfer.tenant_id)
                .execute(&mut *tx)
                .await?
            }
            None => {
                sqlx::query(
                    "UPDATE sessions
                     SET status = 'unassigned', assigned_agent_id = NULL, assigned_team_id = ?,
                         assigned_at = NULL, version = version + 1
                     WHERE session_id = ? AND tenant_id = ? AND version = ? AND status <> 'resolved'",
                )
                .bind(transfer.to_team_id)
                .bind(transfer.session_id)
                .bind(transfer.tenant_id)
                .bind(before.version)
                .execute(&mut *tx)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            let after = self.get_session(transfer.tenant_id, transfer.session_id).await?;
            return Ok(match after {
                None => TransferOutcome::NotFound,
                Some(s) if s.is_resolved() => TransferOutcome::AlreadyResolved,
                Some(s) if s.version != before.version => TransferOutcome::ConcurrentlyModified,
                Some(_) => TransferOutcome::TargetAtCapacity,
            });
        }

        let to_team = transfer.to_team_id.or(if transfer.to_agent_id.is_some() {
            before.assigned_team_id.as_deref()
        } else {
            None
        });

        sqlx::query(
            "INSERT INTO session_transfers (session_id, from_agent_id, from_team_id, to_agent_id, to_team_id,
                                            reason, transferred_by, transferred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(transfer.session_id)
        .bind(&before.assigned_agent_id)
        .bind(&before.assigned_team_id)
        .bind(transfer.to_agent_id)
        .bind(to_team)
        .bind(transfer.reason)
        .bind(transfer.transferred_by)
        .bind(transfer.now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Session {} transferred by {}", transfer.session_id, transfer.transferred_by);
        Ok(TransferOutcome::Transferred)
    }

    pub async fn list_transfers(&self, tenant_id: &str, session_id: &str) -> Result<Vec<TransferRecord>> {
        let rows = sqlx::query(
            "SELECT t.transfer_id, t.session_id, t.from_agent_id, t.from_team_id, t.to_agent_id, t.to_team_id,
                    t.reason, t.transferred_by, t.transferred_at
             FROM session_transfers t
             JOIN sessions s ON s.session_id = t.session_id
             WHERE t.session_id = ? AND s.tenant_id = ?
             ORDER BY t.transfer_id",
        )
        .bind(session_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transfer_from_row).collect()
    }

    /// Open (assigned or unassigned) sessions whose last activity falls in
    /// `[from, to]`, oldest activity first
    pub async fn open_sessions_by_activity(
        &self,
        tenant_id: &str,
        from: Option<DateTime<Utc>>,
        to: DateTime<Utc>,
    ) -> Result<Vec<InboxSession>> {
        let sql = format!(
            "SELECT {} FROM sessions
             WHERE tenant_id = ? AND status IN ('assigned', 'unassigned')
               AND (? IS NULL OR last_message_at >= ?)
               AND last_message_at <= ?
             ORDER BY last_message_at ASC, session_id ASC",
            SESSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(from)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(session_from_row).collect()
    }

    /// `(unassigned, assigned)` session counts of a team
    pub async fn team_session_counts(&self, tenant_id: &str, team_id: &str) -> Result<(u64, u64)> {
        let (queued, active): (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(status = 'unassigned'), 0), COALESCE(SUM(status = 'assigned'), 0)
             FROM sessions WHERE tenant_id = ? AND assigned_team_id = ?",
        )
        .bind(tenant_id)
        .bind(team_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((u64::try_from(queued).unwrap_or(0), u64::try_from(active).unwrap_or(0)))
    }

    /// `(created_at, assigned_at)` of sessions assigned since `since`, plus
    /// every session still waiting (`assigned_at = None`)
    pub async fn team_wait_samples(
        &self,
        tenant_id: &str,
        team_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Option<DateTime<Utc>>)>> {
        let rows: Vec<(DateTime<Utc>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT created_at, assigned_at
             FROM sessions
             WHERE tenant_id = ? AND assigned_team_id = ?
               AND (status = 'unassigned' OR (assigned_at IS NOT NULL AND assigned_at >= ?))",
        )
        .bind(tenant_id)
        .bind(team_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// `(assigned_at, resolved_at)` of sessions resolved since `since`
    pub async fn team_resolution_samples(
        &self,
        tenant_id: &str,
        team_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        let rows: Vec<(DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT assigned_at, resolved_at FROM sessions
             WHERE tenant_id = ? AND assigned_team_id = ? AND status = 'resolved'
               AND assigned_at IS NOT NULL AND resolved_at IS NOT NULL AND resolved_at >= ?",
        )
        .bind(tenant_id)
        .bind(team_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

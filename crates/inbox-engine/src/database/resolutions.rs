//! Resolution records: the terminal `assigned → resolved` transition and CSAT.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, warn};

use super::{parse_column, DatabaseManager};
use crate::error::{InboxError, Result};
use crate::resolution::{Resolution, ResolutionCategory, ResolveOutcome};
use crate::session::SessionStatus;

fn resolution_from_row(row: &SqliteRow) -> Result<Resolution> {
    let category: Option<String> = row.try_get("category")?;
    let fields: String = row.try_get("fields")?;
    let csat: Option<i64> = row.try_get("csat_score")?;

    Ok(Resolution {
        session_id: row.try_get("session_id")?,
        tenant_id: row.try_get("tenant_id")?,
        category: category
            .map(|c| parse_column::<ResolutionCategory>(&c, "resolutions.category"))
            .transpose()?,
        notes: row.try_get("notes")?,
        outcome: row.try_get("outcome")?,
        fields: serde_json::from_str(&fields)?,
        resolved_by_agent_id: row.try_get("resolved_by_agent_id")?,
        resolved_at: row.try_get("resolved_at")?,
        csat_score: csat.and_then(|s| u8::try_from(s).ok()),
        csat_feedback: row.try_get("csat_feedback")?,
        csat_recorded_at: row.try_get("csat_recorded_at")?,
    })
}

/// Wrap-up data written together with the transition
#[derive(Debug, Clone)]
pub struct ResolutionWrite<'a> {
    pub tenant_id: &'a str,
    pub session_id: &'a str,
    /// Assignee read before the write; the transition requires it unchanged
    pub expected_agent_id: &'a str,
    pub resolved_by: &'a str,
    pub category: Option<ResolutionCategory>,
    pub notes: Option<String>,
    pub outcome: String,
    pub fields: BTreeMap<String, String>,
    pub now: DateTime<Utc>,
}

impl DatabaseManager {
    /// Resolve an assigned session and create its resolution record atomically
    pub async fn resolve_session(&self, write: ResolutionWrite<'_>) -> Result<ResolveOutcome> {
        let fields_json = serde_json::to_string(&write.fields)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE sessions SET status = 'resolved', resolved_at = ?, version = version + 1
             WHERE session_id = ? AND tenant_id = ? AND status = 'assigned' AND assigned_agent_id = ?",
        )
        .bind(write.now)
        .bind(write.session_id)
        .bind(write.tenant_id)
        .bind(write.expected_agent_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            let current = self.get_session(write.tenant_id, write.session_id).await?;
            return match current {
                None => Err(InboxError::not_found(format!("session {}", write.session_id))),
                Some(s) if s.status == SessionStatus::Resolved => {
                    warn!("Session {} was already resolved", write.session_id);
                    Ok(ResolveOutcome::AlreadyResolved)
                }
                Some(_) => Ok(ResolveOutcome::ConcurrentlyModified),
            };
        }

        sqlx::query(
            "INSERT INTO resolutions (session_id, tenant_id, category, notes, outcome, fields,
                                      resolved_by_agent_id, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(write.session_id)
        .bind(write.tenant_id)
        .bind(write.category.map(|c| c.as_str()))
        .bind(&write.notes)
        .bind(&write.outcome)
        .bind(&fields_json)
        .bind(write.resolved_by)
        .bind(write.now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Session {} resolved by {}", write.session_id, write.resolved_by);

        Ok(ResolveOutcome::Resolved {
            resolution: Resolution {
                session_id: write.session_id.to_string(),
                tenant_id: write.tenant_id.to_string(),
                category: write.category,
                notes: write.notes,
                outcome: write.outcome,
                fields: write.fields,
                resolved_by_agent_id: write.resolved_by.to_string(),
                resolved_at: write.now,
                csat_score: None,
                csat_feedback: None,
                csat_recorded_at: None,
            },
        })
    }

    pub async fn get_resolution(&self, tenant_id: &str, session_id: &str) -> Result<Option<Resolution>> {
        let row = sqlx::query(
            "SELECT session_id, tenant_id, category, notes, outcome, fields, resolved_by_agent_id, resolved_at,
                    csat_score, csat_feedback, csat_recorded_at
             FROM resolutions WHERE session_id = ? AND tenant_id = ?",
        )
        .bind(session_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(resolution_from_row).transpose()
    }

    /// Attach a survey response; the only mutation allowed after resolution
    pub async fn record_csat(
        &self,
        tenant_id: &str,
        session_id: &str,
        score: u8,
        feedback: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE resolutions SET csat_score = ?, csat_feedback = ?, csat_recorded_at = ?
             WHERE session_id = ? AND tenant_id = ?",
        )
        .bind(i64::from(score))
        .bind(feedback)
        .bind(now)
        .bind(session_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

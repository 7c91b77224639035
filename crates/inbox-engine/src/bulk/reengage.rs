//! Mass re-engagement of stale conversations.
//!
//! A session is a candidate when it is still open (`assigned` or
//! `unassigned`), its last activity falls in the selected window, and it has
//! been idle for longer than its channel's inactivity threshold. Sending a
//! re-engagement template does not change the session's state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::config::ReengagementConfig;
use crate::database::DatabaseManager;
use crate::error::{InboxError, Result};
use crate::integration::{AuditAction, AuditEvent, AuditSink, MessageDispatcher};
use crate::session::InboxSession;

/// Which stale sessions to target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpirySelector {
    /// Last activity older than `now - older_than_days`
    OlderThanDays { older_than_days: u32 },
    /// Last activity inside `[start, end]`
    DateRange { start: DateTime<Utc>, end: DateTime<Utc> },
}

impl ExpirySelector {
    /// Build a selector from optional query parameters; exactly one form must
    /// be given
    pub fn from_parts(
        older_than_days: Option<u32>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        match (older_than_days, start, end) {
            (Some(days), None, None) => Ok(ExpirySelector::OlderThanDays { older_than_days: days }),
            (None, Some(start), Some(end)) => Ok(ExpirySelector::DateRange { start, end }),
            (Some(_), _, _) => Err(InboxError::validation(
                "give either older_than_days or a start/end range, not both",
            )),
            (None, None, None) => Err(InboxError::validation("older_than_days or a start/end range is required")),
            (None, _, _) => Err(InboxError::validation("a date range needs both start and end")),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ExpirySelector::OlderThanDays { older_than_days } if *older_than_days == 0 => {
                Err(InboxError::validation("older_than_days must be greater than 0"))
            }
            ExpirySelector::DateRange { start, end } if start > end => {
                Err(InboxError::validation("start must not be after end"))
            }
            _ => Ok(()),
        }
    }

    /// `(from, to)` bounds on `last_message_at`
    pub fn window(&self, now: DateTime<Utc>) -> Result<(Option<DateTime<Utc>>, DateTime<Utc>)> {
        match *self {
            ExpirySelector::OlderThanDays { older_than_days } => {
                let to = now
                    .checked_sub_signed(Duration::days(i64::from(older_than_days)))
                    .ok_or_else(|| InboxError::validation("older_than_days is out of range"))?;
                Ok((None, to))
            }
            ExpirySelector::DateRange { start, end } => Ok((Some(start), end)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReengageRequest {
    #[serde(flatten)]
    pub selector: ExpirySelector,
    #[serde(default)]
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredCount {
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReengagementError {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReengagementResult {
    pub sent: usize,
    pub errors: Vec<ReengagementError>,
}

pub struct ReengagementService {
    db: DatabaseManager,
    dispatcher: Arc<dyn MessageDispatcher>,
    audit: Arc<dyn AuditSink>,
    config: ReengagementConfig,
}

impl ReengagementService {
    pub fn new(
        db: DatabaseManager,
        dispatcher: Arc<dyn MessageDispatcher>,
        audit: Arc<dyn AuditSink>,
        config: ReengagementConfig,
    ) -> Self {
        Self {
            db,
            dispatcher,
            audit,
            config,
        }
    }

    /// Open sessions matching the selector that are past their channel's
    /// inactivity threshold, oldest activity first
    pub async fn candidates(
        &self,
        tenant_id: &str,
        selector: &ExpirySelector,
        now: DateTime<Utc>,
    ) -> Result<Vec<InboxSession>> {
        selector.validate()?;
        let (from, to) = selector.window(now)?;

        let sessions = self.db.open_sessions_by_activity(tenant_id, from, to).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| now - s.last_message_at >= self.config.threshold_for(&s.channel))
            .collect())
    }

    /// Preview: how many sessions `bulk_reengage` would message
    pub async fn get_expired_count(&self, tenant_id: &str, selector: &ExpirySelector) -> Result<ExpiredCount> {
        let count = self.candidates(tenant_id, selector, Utc::now()).await?.len();
        Ok(ExpiredCount { count })
    }

    /// Send the re-engagement template to every candidate, one at a time
    ///
    /// Dispatch failures are collected per session and never abort the batch.
    pub async fn bulk_reengage(
        &self,
        tenant_id: &str,
        actor_id: &str,
        request: &ReengageRequest,
    ) -> Result<ReengagementResult> {
        let template_id = request
            .template_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.config.default_template_id.as_str());

        let candidates = self.candidates(tenant_id, &request.selector, Utc::now()).await?;
        info!(
            "📣 Re-engaging {} stale session(s) for tenant {} with template {}",
            candidates.len(),
            tenant_id,
            template_id
        );

        let mut result = ReengagementResult::default();
        for session in &candidates {
            let params = template_params(session);
            match self
                .dispatcher
                .send_template_message(&session.contact_id, template_id, &params)
                .await
            {
                Ok(receipt) => {
                    result.sent += 1;
                    self.audit.emit(
                        AuditEvent::new(AuditAction::SessionReengaged, tenant_id, actor_id, &session.session_id)
                            .with_details(json!({
                                "template_id": template_id,
                                "message_id": receipt.message_id,
                            })),
                    );
                }
                Err(e) => {
                    error!("Re-engagement of session {} failed: {}", session.session_id, e);
                    result.errors.push(ReengagementError {
                        session_id: session.session_id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            "📣 Re-engagement done: {} sent, {} failed",
            result.sent,
            result.errors.len()
        );
        Ok(result)
    }
}

fn template_params(session: &InboxSession) -> HashMap<String, String> {
    let mut params = HashMap::new();
    params.insert("session_id".to_string(), session.session_id.clone());
    params.insert("channel".to_string(), session.channel.clone());
    if let Some(name) = &session.contact_name {
        params.insert("contact_name".to_string(), name.clone());
    }
    params
}

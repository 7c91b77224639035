use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InboxError, Result};

/// Lifecycle of an inbox conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unassigned,
    Assigned,
    Resolved,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Unassigned => "unassigned",
            SessionStatus::Assigned => "assigned",
            SessionStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = InboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unassigned" => Ok(SessionStatus::Unassigned),
            "assigned" => Ok(SessionStatus::Assigned),
            "resolved" => Ok(SessionStatus::Resolved),
            other => Err(InboxError::validation(format!("unknown session status '{}'", other))),
        }
    }
}

/// The conversation/ticket routed between agents
///
/// An `unassigned` session with `assigned_team_id` set is queued to that
/// team. An `assigned` session always names its agent and keeps the team it
/// was routed through as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxSession {
    pub session_id: String,
    pub tenant_id: String,
    pub contact_id: String,
    pub contact_name: Option<String>,
    pub channel: String,
    pub status: SessionStatus,
    pub assigned_agent_id: Option<String>,
    pub assigned_team_id: Option<String>,
    /// Higher is more urgent
    pub priority: i64,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_message_at: DateTime<Utc>,
    /// Incremented on every transition
    pub version: i64,
}

impl InboxSession {
    pub fn is_resolved(&self) -> bool {
        self.status == SessionStatus::Resolved
    }
}

/// Inbound contact event that opens a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub contact_id: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    pub channel: String,
    /// Queue the session to this team
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub context: Option<String>,
}

impl NewSession {
    pub fn new(contact_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            contact_name: None,
            channel: channel.into(),
            team_id: None,
            priority: 0,
            context: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_contact_name(mut self, name: impl Into<String>) -> Self {
        self.contact_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.contact_id.trim().is_empty() {
            return Err(InboxError::validation("contact_id cannot be empty"));
        }
        if self.channel.trim().is_empty() {
            return Err(InboxError::validation("channel cannot be empty"));
        }
        Ok(())
    }
}

/// Filter for listing sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub team_id: Option<String>,
    pub agent_id: Option<String>,
    pub limit: Option<u32>,
}

/// One row of the transfer log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transfer_id: i64,
    pub session_id: String,
    pub from_agent_id: Option<String>,
    pub from_team_id: Option<String>,
    pub to_agent_id: Option<String>,
    pub to_team_id: Option<String>,
    pub reason: Option<String>,
    pub transferred_by: String,
    pub transferred_at: DateTime<Utc>,
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InboxError, Result};

/// Capacity granted to a new agent when none is given
pub const DEFAULT_MAX_CONCURRENT_CHATS: u32 = 3;

/// Coarse operational state used by routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Busy,
}

/// Fine-grained presence label shown to supervisors
///
/// Several reasons map onto the same [`AgentStatus`]; only `online` agents
/// are routing candidates, whatever their reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceReason {
    Available,
    Busy,
    Unavailable,
    OffShift,
    OnLeave,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Offline => "offline",
            AgentStatus::Busy => "busy",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = InboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "online" => Ok(AgentStatus::Online),
            "offline" => Ok(AgentStatus::Offline),
            "busy" => Ok(AgentStatus::Busy),
            other => Err(InboxError::validation(format!("unknown agent status '{}'", other))),
        }
    }
}

impl PresenceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceReason::Available => "available",
            PresenceReason::Busy => "busy",
            PresenceReason::Unavailable => "unavailable",
            PresenceReason::OffShift => "off_shift",
            PresenceReason::OnLeave => "on_leave",
        }
    }

    /// Reason assumed when a status change does not carry one
    pub fn default_for(status: AgentStatus) -> Self {
        match status {
            AgentStatus::Online => PresenceReason::Available,
            AgentStatus::Busy | AgentStatus::Offline => PresenceReason::Unavailable,
        }
    }

    /// Whether this label may be shown for an agent in `status`
    ///
    /// `busy` is an online agent who is still reachable but flagged as loaded,
    /// so it requires `online`; the absence labels require the agent to be out.
    pub fn is_compatible_with(&self, status: AgentStatus) -> bool {
        match self {
            PresenceReason::Available | PresenceReason::Busy => status == AgentStatus::Online,
            PresenceReason::Unavailable => {
                matches!(status, AgentStatus::Busy | AgentStatus::Offline)
            }
            PresenceReason::OffShift | PresenceReason::OnLeave => status == AgentStatus::Offline,
        }
    }
}

impl fmt::Display for PresenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceReason {
    type Err = InboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(PresenceReason::Available),
            "busy" => Ok(PresenceReason::Busy),
            "unavailable" => Ok(PresenceReason::Unavailable),
            "off_shift" => Ok(PresenceReason::OffShift),
            "on_leave" => Ok(PresenceReason::OnLeave),
            other => Err(InboxError::validation(format!("unknown presence reason '{}'", other))),
        }
    }
}

/// One agent user and their routing-relevant state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: String,
    pub tenant_id: String,
    pub display_name: String,
    pub status: AgentStatus,
    pub presence_reason: PresenceReason,
    pub max_concurrent_chats: u32,
    /// Deactivated agents are kept for reporting but never routed to
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why an agent is or is not a routing candidate for a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    Inactive,
    NotOnline,
    AtCapacity,
    NotMember,
    OutsideShift,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InboxError, Result};

/// Scope key of the tenant-wide assignment configuration row
pub const TENANT_WIDE_SCOPE: &str = "*";

/// Policy governing automatic assignment for a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    RoundRobin,
    Manual,
    SpecificAgents,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::RoundRobin => "round_robin",
            RoutingStrategy::Manual => "manual",
            RoutingStrategy::SpecificAgents => "specific_agents",
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingStrategy {
    type Err = InboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "round_robin" => Ok(RoutingStrategy::RoundRobin),
            "manual" => Ok(RoutingStrategy::Manual),
            "specific_agents" => Ok(RoutingStrategy::SpecificAgents),
            other => Err(InboxError::validation(format!("unknown routing strategy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Member,
    Leader,
    Manager,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Member => "member",
            TeamRole::Leader => "leader",
            TeamRole::Manager => "manager",
        }
    }
}

impl FromStr for TeamRole {
    type Err = InboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "member" => Ok(TeamRole::Member),
            "leader" => Ok(TeamRole::Leader),
            "manager" => Ok(TeamRole::Manager),
            other => Err(InboxError::validation(format!("unknown team role '{}'", other))),
        }
    }
}

/// A tenant-scoped group of agents sharing a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub routing_strategy: RoutingStrategy,
    /// Only agents inside an active shift are routing candidates
    pub shift_enforcement: bool,
    /// Last agent that received a session from this team's rotation
    pub rotation_cursor: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a team
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTeam {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_strategy")]
    pub routing_strategy: RoutingStrategy,
    #[serde(default)]
    pub shift_enforcement: bool,
}

fn default_strategy() -> RoutingStrategy {
    RoutingStrategy::RoundRobin
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub team_id: String,
    pub user_id: String,
    pub role: TeamRole,
    pub joined_at: DateTime<Utc>,
}

/// Strategy-specific parameters stored with an assignment configuration
///
/// `agent_ids` is the ordered allow-list of the specific-agents strategy.
/// Keys this engine does not interpret are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategySettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_ids: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Assignment configuration for a team, or tenant-wide when `team_id` is `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentConfig {
    pub tenant_id: String,
    pub team_id: Option<String>,
    pub enabled: bool,
    pub strategy: RoutingStrategy,
    pub settings: StrategySettings,
    pub updated_at: DateTime<Utc>,
}

impl AssignmentConfig {
    /// Whether the engine should assign automatically under this config
    pub fn is_automatic(&self) -> bool {
        self.enabled && self.strategy != RoutingStrategy::Manual
    }
}

/// When an agent is expected on duty; `team_id = None` covers every team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub shift_id: String,
    pub tenant_id: String,
    pub team_id: Option<String>,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Shift {
    /// Whether this shift puts its agent on duty for `team_id` at `now`
    pub fn covers(&self, team_id: &str, now: DateTime<Utc>) -> bool {
        let team_matches = self.team_id.as_deref().map_or(true, |t| t == team_id);
        team_matches && self.start_time <= now && now < self.end_time
    }
}

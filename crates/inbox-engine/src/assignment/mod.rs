//! # Assignment Engine
//!
//! Moves `unassigned` sessions from a team's queue onto eligible agents.
//!
//! - **round_robin**: candidates are the team members ordered by user id;
//!   each session goes to the first eligible agent after the team's rotation
//!   cursor, and the cursor moves to that agent in the same transaction as
//!   the claim.
//! - **specific_agents**: as round robin, over the ordered allow-list from
//!   the assignment settings (restricted to team members).
//! - **manual**: no automatic assignment; agents claim sessions themselves.
//!
//! Sessions are processed highest priority first, then oldest activity.
//! A claim is one conditional update, so an engine pass and a manual claim
//! racing on the same session cannot both win; the loser sees
//! [`ClaimOutcome::AlreadyClaimed`] and moves on.

pub mod engine;
pub mod rotation;

use serde::{Deserialize, Serialize};

pub use engine::AssignmentEngine;
pub use rotation::rotation_order;

/// Result of one claim attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Claimed { agent_id: String },
    /// The session was assigned, moved or resolved by someone else
    AlreadyClaimed,
    /// The agent went offline or reached capacity before the write
    AgentUnavailable,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed { .. })
    }
}

/// Result of `assignQueue`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentSummary {
    pub assigned: usize,
}

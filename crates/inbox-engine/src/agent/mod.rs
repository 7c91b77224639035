//! Agent presence store and routing eligibility.

pub mod presence;
pub mod types;

pub use presence::{evaluate_eligibility, EligibleAgent, PresenceManager, SYSTEM_ACTOR};
pub use types::{AgentProfile, AgentStatus, Eligibility, PresenceReason, DEFAULT_MAX_CONCURRENT_CHATS};

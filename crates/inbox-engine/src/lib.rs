//! # Inbox Engine
//!
//! Chat assignment and queue management for a multi-tenant agent support
//! inbox.
//!
//! Inbound conversations ([`session::InboxSession`]) are queued to teams and
//! routed to human agents under capacity, presence and shift constraints.
//! Supervisors watch live queue figures, move conversations in bulk and
//! re-engage stale contacts; agents close conversations through a wrap-up
//! workflow.
//!
//! ## Components
//!
//! - [`agent`]: presence store and routing eligibility
//! - [`team`]: teams, membership, assignment configuration, shifts
//! - [`assignment`]: round-robin / specific-agents engine and manual claim
//! - [`queue`]: per-team queue statistics
//! - [`bulk`]: bulk transfer and mass re-engagement
//! - [`resolution`]: wrap-up forms and the resolve transition
//! - [`api`]: the operation facade and its HTTP transport
//! - [`server`]: server lifecycle with the periodic assignment loop
//!
//! ## Concurrency
//!
//! Correctness comes from the store, not from in-process locking. Every
//! session transition (claim, transfer, resolve) is a single conditional
//! update against the row state that was read; the loser of a race gets an
//! outcome such as [`assignment::ClaimOutcome::AlreadyClaimed`] rather than
//! an error, and never a half-applied change.

pub mod agent;
pub mod api;
pub mod assignment;
pub mod bulk;
pub mod config;
pub mod database;
pub mod error;
pub mod integration;
pub mod queue;
pub mod resolution;
pub mod server;
pub mod session;
pub mod team;

pub use api::InboxApi;
pub use config::InboxConfig;
pub use error::{InboxError, Result};
pub use server::{InboxServer, InboxServerBuilder};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        agent::{AgentProfile, AgentStatus, Eligibility, PresenceManager, PresenceReason},
        api::InboxApi,
        assignment::{AssignmentEngine, AssignmentSummary, ClaimOutcome},
        bulk::{
            BulkTransferRequest, BulkTransferResult, ExpiredCount, ExpirySelector, ReengageRequest,
            ReengagementResult, TransferOutcome,
        },
        config::InboxConfig,
        database::DatabaseManager,
        error::{InboxError, Result},
        integration::{Actor, AuditEvent, AuditSink, MessageDispatcher, Permission},
        queue::TeamQueueStats,
        resolution::{
            FieldKind, Resolution, ResolutionCategory, ResolveOutcome, ResolveRequest, WrapUpField, WrapUpForm,
            WrapUpPayload,
        },
        server::{InboxServer, InboxServerBuilder},
        session::{InboxSession, NewSession, SessionFilter, SessionStatus},
        team::{NewTeam, RoutingStrategy, StrategySettings, Team, TeamRole},
    };
}

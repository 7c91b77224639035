//! Teams, membership, assignment configuration and shifts.

pub mod registry;
pub mod types;

pub use registry::{TeamRegistry, TeamSnapshot};
pub use types::{
    AssignmentConfig, NewTeam, RoutingStrategy, Shift, StrategySettings, Team, TeamMember, TeamRole,
    TENANT_WIDE_SCOPE,
};

//! Inbox session domain types
//!
//! Sessions are persisted by [`crate::database::DatabaseManager`] and only
//! change state through conditional updates issued by the assignment engine,
//! bulk operations and the resolution workflow.

pub mod types;

pub use types::{InboxSession, NewSession, SessionFilter, SessionStatus, TransferRecord};

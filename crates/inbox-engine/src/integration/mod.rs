//! Contracts with the collaborators around the inbox: outbound messaging,
//! audit logging and caller identity.

pub mod audit;
pub mod auth;
pub mod messaging;

pub use audit::{AuditAction, AuditEvent, AuditSink, BroadcastAuditSink, TracingAuditSink};
pub use auth::{Actor, Permission};
pub use messaging::{LoggingDispatcher, MessageDispatcher, MessageReceipt};

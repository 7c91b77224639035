//! Supervisor batch operations: bulk transfer and mass re-engagement.
//!
//! Both are fan-outs over independent per-session attempts. The aggregate
//! result always lists per-item outcomes; one failing item never fails the
//! batch.

pub mod reengage;
pub mod transfer;

pub use reengage::{
    ExpiredCount, ExpirySelector, ReengageRequest, ReengagementError, ReengagementResult, ReengagementService,
};
pub use transfer::{BulkTransferRequest, BulkTransferResult, BulkTransferService, SessionTransferResult, TransferOutcome};

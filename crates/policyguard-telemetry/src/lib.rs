//! PolicyGuard Telemetry
//!
//! Audit trail and metrics functionality for PolicyGuard.
//!
//! Provides:
//! - Hash-chained audit records for every moderation decision
//! - JSON-lines persistence with verification on reopen
//! - An async recorder decoupling request handling from audit I/O
//! - Metric names and descriptions

pub mod audit;
pub mod metrics;
pub mod persistence;
pub mod service;

pub use audit::{verify_chain, AuditEntry, AuditRecord, AuditTrail, ChainHead, ChainViolation};
pub use persistence::{read_records, verify_log, AuditLogConfig, AuditLogWriter};
pub use service::{AuditRecorder, DEFAULT_RECENT_CAPACITY};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditEntry, AuditRecord, AuditTrail};
    pub use crate::service::AuditRecorder;
}

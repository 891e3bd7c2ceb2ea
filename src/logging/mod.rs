//! Logging infrastructure for ibops
//!
//! Application logs go through `tracing`; state transitions additionally go
//! to the audit trail.

pub mod audit;

pub use audit::{AuditEvent, AuditLogger};

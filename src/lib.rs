//! ibops - multi-tenant business operations service
//!
//! ## Modules
//!
//! - **Finance**: billing, receivables, payables, double-entry journal, assets, tax
//! - **Commerce**: the 9-stage lead SOP and the evaluate → commit → contract →
//!   handoff deal workflow with its approval matrix
//! - **Workspace**: tasks, approval requests, channels, notifications
//! - **Tenancy**: signup, organizations, users and the super-admin view

#[macro_use]
mod macros;

pub mod auth;
pub mod commerce;
pub mod config;
pub mod db;
pub mod finance;
pub mod logging;
pub mod routes;
pub mod server;
pub mod tenancy;
pub mod types;
pub mod workspace;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{IbError, Result};

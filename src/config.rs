//! Configuration for ibops
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::types::IbError;

/// Development-only signing secret (never accepted outside dev mode)
pub const DEV_JWT_SECRET: &str = "dev-only-insecure-secret-change-me-0123456789";

/// ibops - business operations service
#[derive(Parser, Debug, Clone)]
#[command(name = "ibops")]
#[command(about = "Multi-tenant finance, commerce and workspace API")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory fallback, verification codes echoed)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "ibops")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Access token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Refresh token expiry in seconds
    #[arg(long, env = "REFRESH_EXPIRY_SECONDS", default_value = "604800")]
    pub refresh_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,

    /// Optional JSONL file receiving audit events
    #[arg(long, env = "AUDIT_LOG_PATH")]
    pub audit_log_path: Option<PathBuf>,

    /// Signup session configuration
    #[command(flatten)]
    pub signup: SignupArgs,

    /// Commit approval thresholds
    #[command(flatten)]
    pub approval: ApprovalArgs,

    /// Platform super-admin created at startup if missing
    #[arg(long, env = "SUPER_ADMIN_EMAIL")]
    pub super_admin_email: Option<String>,

    /// Password for the bootstrap super-admin
    #[arg(long, env = "SUPER_ADMIN_PASSWORD")]
    pub super_admin_password: Option<String>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Signup session configuration
#[derive(Parser, Debug, Clone)]
pub struct SignupArgs {
    /// Lifetime of a pending signup session
    #[arg(long, env = "SIGNUP_SESSION_TTL_SECONDS", default_value = "900")]
    pub signup_session_ttl_seconds: u64,

    /// Wrong verification codes allowed before the session is destroyed
    #[arg(long, env = "SIGNUP_MAX_ATTEMPTS", default_value = "5")]
    pub signup_max_attempts: u32,

    /// Maximum number of concurrently pending signup sessions
    #[arg(long, env = "SIGNUP_MAX_SESSIONS", default_value = "10000")]
    pub signup_max_sessions: usize,
}

/// Thresholds feeding the commit approval matrix
#[derive(Parser, Debug, Clone)]
pub struct ApprovalArgs {
    /// Deal value above which the finance head must approve
    #[arg(long, env = "APPROVAL_FINANCE_VALUE", default_value = "100000")]
    pub approval_finance_value: Decimal,

    /// Deal value above which the CEO must approve
    #[arg(long, env = "APPROVAL_CEO_VALUE", default_value = "500000")]
    pub approval_ceo_value: Decimal,

    /// Revenue margin percent below which the finance head must approve
    #[arg(long, env = "APPROVAL_MIN_MARGIN", default_value = "20")]
    pub approval_min_margin: Decimal,

    /// Revenue margin percent below which the CEO must approve
    #[arg(long, env = "APPROVAL_CRITICAL_MARGIN", default_value = "10")]
    pub approval_critical_margin: Decimal,

    /// Risk score at or above which legal must approve
    #[arg(long, env = "APPROVAL_LEGAL_RISK", default_value = "60")]
    pub approval_legal_risk: Decimal,

    /// Risk score at or above which the CEO must approve
    #[arg(long, env = "APPROVAL_CEO_RISK", default_value = "80")]
    pub approval_ceo_risk: Decimal,
}

impl Args {
    /// Get effective JWT secret (falls back to a fixed secret in dev mode)
    pub fn jwt_secret(&self) -> Result<String, IbError> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Ok(secret.clone()),
            (None, true) => Ok(DEV_JWT_SECRET.to_string()),
            (None, false) => Err(IbError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.jwt_secret.as_ref().is_some_and(|s| s.len() < 32) {
            return Err("JWT_SECRET must be at least 32 characters".to_string());
        }

        if self.jwt_expiry_seconds == 0 || self.refresh_expiry_seconds == 0 {
            return Err("Token expiry must be greater than zero".to_string());
        }

        if self.refresh_expiry_seconds < self.jwt_expiry_seconds {
            return Err("REFRESH_EXPIRY_SECONDS must not be shorter than JWT_EXPIRY_SECONDS".to_string());
        }

        if self.signup.signup_max_attempts == 0 {
            return Err("SIGNUP_MAX_ATTEMPTS must be at least 1".to_string());
        }

        let a = &self.approval;
        if a.approval_ceo_value < a.approval_finance_value {
            return Err("APPROVAL_CEO_VALUE must be >= APPROVAL_FINANCE_VALUE".to_string());
        }
        if a.approval_critical_margin > a.approval_min_margin {
            return Err("APPROVAL_CRITICAL_MARGIN must be <= APPROVAL_MIN_MARGIN".to_string());
        }
        if a.approval_ceo_risk < a.approval_legal_risk {
            return Err("APPROVAL_CEO_RISK must be >= APPROVAL_LEGAL_RISK".to_string());
        }

        if self.super_admin_email.is_some() != self.super_admin_password.is_some() {
            return Err(
                "SUPER_ADMIN_EMAIL and SUPER_ADMIN_PASSWORD must be set together".to_string(),
            );
        }

        Ok(())
    }

    /// Arguments for tests and embedded use (dev mode, all defaults)
    pub fn for_dev() -> Self {
        Self::parse_from(["ibops", "--dev-mode"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_requires_secret() {
        let args = Args::parse_from(["ibops"]);
        assert!(args.validate().is_err());
        assert!(args.jwt_secret().is_err());
    }

    #[test]
    fn test_dev_mode_defaults() {
        let args = Args::for_dev();
        assert!(args.validate().is_ok());
        assert!(args.jwt_secret().unwrap().len() >= 32);
        assert_eq!(args.signup.signup_max_attempts, 5);
        assert_eq!(args.approval.approval_ceo_value, Decimal::from(500_000));
    }

    #[test]
    fn test_short_secret_rejected() {
        let args = Args::parse_from(["ibops", "--jwt-secret", "too-short"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let args = Args::parse_from([
            "ibops",
            "--dev-mode",
            "--approval-finance-value",
            "900000",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_super_admin_pair() {
        let args = Args::parse_from(["ibops", "--dev-mode", "--super-admin-email", "root@ib.test"]);
        assert!(args.validate().is_err());
    }
}

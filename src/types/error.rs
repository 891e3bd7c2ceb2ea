//! Error types for ibops
//!
//! Every handler funnels failures through `IbError` so status codes and
//! machine-readable codes stay consistent across modules.

use hyper::StatusCode;

/// Main error type for ibops operations
#[derive(Debug, thiserror::Error)]
pub enum IbError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Forbidden with a specific machine code (suspended org, disabled solution)
    #[error("Forbidden: {message}")]
    Denied { code: &'static str, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency check failed
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// A workflow or SOP stage gate is not satisfied
    #[error("Stage gate blocked: {0}")]
    Gate(String),

    #[error("Too many attempts: {0}")]
    TooManyAttempts(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl IbError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Denied { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::VersionConflict(_) => StatusCode::CONFLICT,
            Self::Gate(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TooManyAttempts(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable machine-readable code returned alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Denied { code, .. } => code,
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::VersionConflict(_) => "VERSION_CONFLICT",
            Self::Gate(_) => "GATE_BLOCKED",
            Self::TooManyAttempts(_) => "TOO_MANY_ATTEMPTS",
            Self::Database(_) => "DB_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
        }
    }

    /// Message safe to show to clients.
    ///
    /// Database and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) => "Database error".to_string(),
            Self::Internal(_) | Self::Config(_) => "Internal server error".to_string(),
            Self::Denied { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.public_message(),
            "code": self.code(),
        })
        .to_string();
        (status, body)
    }

    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound(format!("{kind} '{id}' not found"))
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for IbError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for IbError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for IbError {
    fn from(err: hyper::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<mongodb::error::Error> for IbError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for IbError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON encode error: {}", err))
    }
}

impl From<bson::de::Error> for IbError {
    fn from(err: bson::de::Error) -> Self {
        Self::Internal(format!("BSON decode error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for IbError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for ibops operations
pub type Result<T> = std::result::Result<T, IbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(IbError::Gate("x".into()).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            IbError::VersionConflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(IbError::not_found("lead", "1").status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_database_details_hidden() {
        let (status, body) =
            IbError::Database("connection refused at 10.0.0.3".into()).into_status_code_and_body();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.contains("10.0.0.3"));
        assert!(body.contains("DB_ERROR"));
    }

    #[test]
    fn test_denied_uses_own_code() {
        let err = IbError::Denied {
            code: "ORG_SUSPENDED",
            message: "Organization is suspended".into(),
        };
        assert_eq!(err.code(), "ORG_SUSPENDED");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }
}

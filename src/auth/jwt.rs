//! JWT token handling
//!
//! Provides functions for generating and validating the access and refresh
//! tokens handed out at login and signup.
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256)
//! - Access tokens default to 1 hour, refresh tokens to 7 days
//! - `ver` must match the user's `token_version`; logout bumps it

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::Role;
use crate::db::schemas::UserDoc;
use crate::types::IbError;

/// Which of the two token kinds a JWT is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User email
    pub sub: String,
    pub user_id: String,
    pub org_id: String,
    pub role_id: Role,
    pub token_type: TokenType,
    /// User token version at issue time
    pub ver: i64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }

    /// Claims of a valid token, or `Unauthorized` with the failure reason
    pub fn into_claims(self) -> Result<Claims, IbError> {
        match self.claims {
            Some(claims) if self.valid => Ok(claims),
            _ => Err(IbError::Unauthorized(
                self.error.unwrap_or_else(|| "Invalid token".to_string()),
            )),
        }
    }
}

/// Access and refresh token issued together
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
    refresh_expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64, refresh_expiry_seconds: u64) -> Result<Self, IbError> {
        if secret.is_empty() {
            return Err(IbError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(IbError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
            refresh_expiry_seconds,
        })
    }

    /// Create a validator for dev mode and tests
    pub fn new_dev() -> Self {
        Self {
            secret: crate::config::DEV_JWT_SECRET.into(),
            expiry_seconds: 3600,
            refresh_expiry_seconds: 7 * 24 * 60 * 60,
        }
    }

    fn issue(&self, user: &UserDoc, token_type: TokenType, ttl: u64) -> Result<String, IbError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| IbError::Auth(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: user.email.clone(),
            user_id: user.id.clone(),
            org_id: user.org_id.clone(),
            role_id: user.role,
            token_type,
            ver: user.token_version,
            iat: now,
            exp: now + ttl,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| IbError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Generate a short-lived access token
    pub fn generate_access_token(&self, user: &UserDoc) -> Result<String, IbError> {
        self.issue(user, TokenType::Access, self.expiry_seconds)
    }

    /// Generate a refresh token with longer expiry
    pub fn generate_refresh_token(&self, user: &UserDoc) -> Result<String, IbError> {
        self.issue(user, TokenType::Refresh, self.refresh_expiry_seconds)
    }

    /// Generate both tokens for a freshly authenticated user
    pub fn generate_pair(&self, user: &UserDoc) -> Result<TokenPair, IbError> {
        Ok(TokenPair {
            access_token: self.generate_access_token(user)?,
            refresh_token: self.generate_refresh_token(user)?,
            token_type: "bearer",
            expires_in: self.expiry_seconds,
        })
    }

    /// Verify and decode a JWT token of the expected kind
    pub fn verify_token(&self, token: &str, expected: TokenType) -> TokenValidationResult {
        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) if token_data.claims.token_type != expected => {
                TokenValidationResult::invalid("Wrong token type")
            }
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    // Raw token
    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

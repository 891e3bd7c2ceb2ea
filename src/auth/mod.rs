//! Authentication and authorization for ibops
//!
//! Provides:
//! - JWT access/refresh token generation and validation
//! - Roles, capabilities and the per-request `AuthContext`
//! - Password hashing with Argon2
//! - The pending-signup session store

mod context;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod signup_session;

pub use context::{require, AuthContext};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenPair, TokenType, TokenValidationResult};
pub use password::{hash_password, validate_password_strength, verify_password};
pub use permissions::{Capability, Role};
pub use signup_session::{SignupSession, SignupSessionStore};

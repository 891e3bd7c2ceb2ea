//! User document schema
//!
//! Stores credentials, role and tenant linkage.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserDoc {
    /// Business identifier (UUID)
    pub id: String,

    /// Common metadata (created_at, updated_at, is_deleted, version)
    #[serde(default)]
    pub metadata: Metadata,

    /// Tenant the user belongs to
    pub org_id: String,

    /// Login email, stored lowercase
    pub email: String,

    pub full_name: String,

    /// Argon2 password hash
    #[serde(default)]
    pub password_hash: String,

    #[serde(default)]
    pub role: Role,

    /// Token version for invalidation (increment to invalidate refresh tokens)
    #[serde(default)]
    pub token_version: i64,

    /// Whether the user account is active
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Whether the email was verified during signup
    #[serde(default)]
    pub email_verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    /// Create a new user document
    pub fn new(org_id: &str, email: &str, full_name: &str, password_hash: String, role: Role) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            org_id: org_id.to_string(),
            email: normalize_email(email),
            full_name: full_name.trim().to_string(),
            password_hash,
            role,
            token_version: 1,
            is_active: true,
            email_verified: false,
            last_login_at: None,
        }
    }
}

/// Canonical form used for storage and lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on email
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            // Index on org_id for tenant listings
            (
                doc! { "org_id": 1 },
                Some(IndexOptions::builder().name("org_id_index".to_string()).build()),
            ),
        ]
    }
}

impl_record!(UserDoc, USER_COLLECTION, "user");

//! Organization settings and user administration for org admins

use bson::doc;
use serde::Deserialize;

use super::UserView;
use crate::auth::{hash_password, validate_password_strength, AuthContext, Role};
use crate::commerce::sop::is_valid_email;
use crate::db::schemas::{normalize_email, OrganizationDoc, UserDoc};
use crate::db::{modify_scoped, Stores};
use crate::logging::{AuditEvent, AuditLogger};
use crate::types::{IbError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrgRequest {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetSolutionsRequest {
    pub finance: Option<bool>,
    pub commerce: Option<bool>,
    pub workspace: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub full_name: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

fn optional(value: &Option<String>) -> Option<Option<String>> {
    value
        .as_ref()
        .map(|v| Some(v.trim().to_string()).filter(|v| !v.is_empty()))
}

#[derive(Clone)]
pub struct OrgService {
    stores: Stores,
    audit: AuditLogger,
}

impl OrgService {
    pub fn new(stores: Stores, audit: AuditLogger) -> Self {
        Self { stores, audit }
    }

    pub async fn get_org(&self, ctx: &AuthContext) -> Result<OrganizationDoc> {
        crate::db::get_scoped(self.stores.organizations.as_ref(), &ctx.org_id, &ctx.org_id).await
    }

    pub async fn update_org(&self, ctx: &AuthContext, req: UpdateOrgRequest) -> Result<OrganizationDoc> {
        if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(IbError::Validation("name must not be empty".into()));
        }

        let org = modify_scoped(self.stores.organizations.as_ref(), &ctx.org_id, &ctx.org_id, |org| {
            if let Some(name) = &req.name {
                org.name = name.trim().to_string();
            }
            if let Some(industry) = optional(&req.industry) {
                org.industry = industry;
            }
            if let Some(country) = optional(&req.country) {
                org.country = country;
            }
            if let Some(website) = optional(&req.website) {
                org.website = website;
            }
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "org.updated", "organization", &org.id).await;
        Ok(org)
    }

    pub async fn set_solutions(
        &self,
        ctx: &AuthContext,
        req: SetSolutionsRequest,
    ) -> Result<OrganizationDoc> {
        let org = modify_scoped(self.stores.organizations.as_ref(), &ctx.org_id, &ctx.org_id, |org| {
            if let Some(finance) = req.finance {
                org.solutions.finance = finance;
            }
            if let Some(commerce) = req.commerce {
                org.solutions.commerce = commerce;
            }
            if let Some(workspace) = req.workspace {
                org.solutions.workspace = workspace;
            }
            Ok(())
        })
        .await?;

        self.audit
            .log(
                AuditEvent::new("org.solutions_changed", "organization", &org.id)
                    .by(ctx)
                    .with_detail(serde_json::json!(org.solutions)),
            )
            .await;
        Ok(org)
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn list_users(&self, ctx: &AuthContext) -> Result<Vec<UserView>> {
        let users = self
            .stores
            .users
            .find_many(doc! { "org_id": &ctx.org_id })
            .await?;
        Ok(users.iter().map(UserView::from).collect())
    }

    pub async fn create_user(&self, ctx: &AuthContext, req: CreateUserRequest) -> Result<UserView> {
        if req.role == Role::SuperAdmin {
            return Err(IbError::Forbidden("super_admin cannot be assigned".into()));
        }
        let email = normalize_email(&req.email);
        if !is_valid_email(&email) {
            return Err(IbError::Validation("A valid email is required".into()));
        }
        if req.full_name.trim().is_empty() {
            return Err(IbError::Validation("full_name is required".into()));
        }
        validate_password_strength(&req.password)?;
        if self.stores.users.count(doc! { "email": &email }).await? > 0 {
            return Err(IbError::Conflict("An account with this email already exists".into()));
        }

        let user = UserDoc::new(
            &ctx.org_id,
            &email,
            &req.full_name,
            hash_password(&req.password)?,
            req.role,
        );
        let user = self.stores.users.insert(user).await?;

        self.audit
            .log(
                AuditEvent::new("user.created", "user", &user.id)
                    .by(ctx)
                    .with_detail(serde_json::json!({ "role": user.role })),
            )
            .await;
        Ok(UserView::from(&user))
    }

    pub async fn set_role(&self, ctx: &AuthContext, user_id: &str, req: SetRoleRequest) -> Result<UserView> {
        if req.role == Role::SuperAdmin {
            return Err(IbError::Forbidden("super_admin cannot be assigned".into()));
        }
        if user_id == ctx.user_id {
            return Err(IbError::Conflict("You cannot change your own role".into()));
        }

        let user = modify_scoped(self.stores.users.as_ref(), &ctx.org_id, user_id, |u| {
            if u.role == Role::SuperAdmin {
                return Err(IbError::Forbidden("super_admin accounts are managed by the platform".into()));
            }
            u.role = req.role;
            // role is baked into issued tokens
            u.token_version += 1;
            Ok(())
        })
        .await?;

        self.audit
            .log(
                AuditEvent::new("user.role_changed", "user", &user.id)
                    .by(ctx)
                    .with_detail(serde_json::json!({ "role": user.role })),
            )
            .await;
        Ok(UserView::from(&user))
    }

    pub async fn set_active(&self, ctx: &AuthContext, user_id: &str, req: SetActiveRequest) -> Result<UserView> {
        if user_id == ctx.user_id && !req.is_active {
            return Err(IbError::Conflict("You cannot deactivate yourself".into()));
        }

        let user = modify_scoped(self.stores.users.as_ref(), &ctx.org_id, user_id, |u| {
            if u.is_active != req.is_active {
                u.is_active = req.is_active;
                u.token_version += 1;
            }
            Ok(())
        })
        .await?;

        let action = if user.is_active { "user.activated" } else { "user.deactivated" };
        self.audit.record(ctx, action, "user", &user.id).await;
        Ok(UserView::from(&user))
    }
}

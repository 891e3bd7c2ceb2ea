//! Accounts: signup, login, token refresh, logout, password change
//!
//! Tokens are stateless JWTs, but every authenticated request is checked
//! against the stored user: a deactivated account or a bumped
//! `token_version` invalidates outstanding tokens immediately.

use bson::doc;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::UserView;
use crate::auth::{
    extract_token_from_header, hash_password, validate_password_strength, verify_password,
    AuthContext, JwtValidator, Role, SignupSessionStore, TokenPair, TokenType,
};
use crate::commerce::sop::is_valid_email;
use crate::db::schemas::{
    normalize_email, OrganizationDoc, Solution, Solutions, UserDoc, PLATFORM_ORG_ID,
};
use crate::db::{get_scoped, modify_scoped, Stores};
use crate::logging::{AuditEvent, AuditLogger};
use crate::types::{IbError, Result};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Clone, Deserialize)]
pub struct SignupStartRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupResendRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupVerifyRequest {
    pub session_id: String,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupCompleteRequest {
    pub session_id: String,
    pub company_name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Empty enables every solution
    #[serde(default)]
    pub solutions: Vec<Solution>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupStarted {
    pub session_id: String,
    pub expires_in: u64,
    /// Echoed only in dev mode; otherwise the code reaches the user by mail
    /// from outside this service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserView,
    pub organization: OrganizationDoc,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub user: UserView,
    pub organization: OrganizationDoc,
}

#[derive(Clone)]
pub struct AccountService {
    stores: Stores,
    jwt: JwtValidator,
    signups: Arc<SignupSessionStore>,
    audit: AuditLogger,
    dev_mode: bool,
}

impl AccountService {
    pub fn new(
        stores: Stores,
        jwt: JwtValidator,
        signups: Arc<SignupSessionStore>,
        audit: AuditLogger,
        dev_mode: bool,
    ) -> Self {
        Self {
            stores,
            jwt,
            signups,
            audit,
            dev_mode,
        }
    }

    pub fn signups(&self) -> &Arc<SignupSessionStore> {
        &self.signups
    }

    async fn email_taken(&self, email: &str) -> Result<bool> {
        Ok(self.stores.users.count(doc! { "email": email }).await? > 0)
    }

    async fn load_org(&self, org_id: &str) -> Result<OrganizationDoc> {
        get_scoped(self.stores.organizations.as_ref(), org_id, org_id).await
    }

    fn started(&self, session_id: String, expires_in: u64, code: String) -> SignupStarted {
        SignupStarted {
            session_id,
            expires_in,
            dev_code: self.dev_mode.then_some(code),
        }
    }

    // =========================================================================
    // Signup
    // =========================================================================

    pub async fn signup_start(&self, req: SignupStartRequest) -> Result<SignupStarted> {
        let email = normalize_email(&req.email);
        if !is_valid_email(&email) {
            return Err(IbError::Validation("A valid email is required".into()));
        }
        let full_name = req.full_name.trim();
        if full_name.is_empty() {
            return Err(IbError::Validation("full_name is required".into()));
        }
        validate_password_strength(&req.password)?;
        if self.email_taken(&email).await? {
            return Err(IbError::Conflict("An account with this email already exists".into()));
        }

        let password_hash = hash_password(&req.password)?;
        let (session, code) = self.signups.start(&email, full_name, password_hash)?;
        info!(session_id = %session.session_id, "Signup code issued");
        Ok(self.started(session.session_id.clone(), session.remaining_seconds(), code))
    }

    pub async fn signup_resend(&self, req: SignupResendRequest) -> Result<SignupStarted> {
        let (session, code) = self.signups.resend(&req.session_id)?;
        Ok(self.started(session.session_id.clone(), session.remaining_seconds(), code))
    }

    pub async fn signup_verify(&self, req: SignupVerifyRequest) -> Result<serde_json::Value> {
        let session = self.signups.verify(&req.session_id, req.code.trim())?;
        Ok(serde_json::json!({
            "session_id": session.session_id,
            "verified": session.verified,
        }))
    }

    /// Create the tenant and its first admin from a verified session
    pub async fn signup_complete(&self, req: SignupCompleteRequest) -> Result<AuthResponse> {
        let company_name = req.company_name.trim();
        if company_name.is_empty() {
            return Err(IbError::Validation("company_name is required".into()));
        }
        // Consumed up front so a session can complete at most once
        let session = self.signups.take_verified(&req.session_id)?;
        if self.email_taken(&session.email).await? {
            return Err(IbError::Conflict("An account with this email already exists".into()));
        }

        let mut org = OrganizationDoc::new(
            company_name,
            req.industry.filter(|s| !s.trim().is_empty()),
            req.country.filter(|s| !s.trim().is_empty()),
            Solutions::from_list(&req.solutions),
        );
        let mut user = UserDoc::new(
            &org.id,
            &session.email,
            &session.full_name,
            session.password_hash.clone(),
            Role::OrgAdmin,
        );
        user.email_verified = true;
        user.last_login_at = Some(Utc::now());
        org.owner_user_id = user.id.clone();

        let org = self.stores.organizations.insert(org).await?;
        let user = self.stores.users.insert(user).await?;

        info!(org_id = %org.id, user_id = %user.id, "Organization created via signup");
        self.audit
            .log(
                AuditEvent::new("org.created", "organization", &org.id)
                    .in_org(&org.id)
                    .with_detail(serde_json::json!({ "owner": user.id })),
            )
            .await;

        Ok(AuthResponse {
            tokens: self.jwt.generate_pair(&user)?,
            user: UserView::from(&user),
            organization: org,
        })
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse> {
        let email = normalize_email(&req.email);
        if email.is_empty() || req.password.is_empty() {
            return Err(IbError::BadRequest("Missing required fields: email, password".into()));
        }

        let Some(user) = self.stores.users.find_one(doc! { "email": &email }).await? else {
            warn!("Login failed - unknown user");
            return Err(IbError::Unauthorized(INVALID_CREDENTIALS.into()));
        };
        if !verify_password(&req.password, &user.password_hash)? {
            warn!(user_id = %user.id, "Login failed - invalid password");
            return Err(IbError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        if !user.is_active {
            return Err(IbError::Forbidden("Account is deactivated".into()));
        }

        let user = modify_scoped(self.stores.users.as_ref(), &user.org_id, &user.id, |u| {
            u.last_login_at = Some(Utc::now());
            Ok(())
        })
        .await?;
        let organization = self.load_org(&user.org_id).await?;

        info!(user_id = %user.id, org_id = %user.org_id, "Login successful");
        Ok(AuthResponse {
            tokens: self.jwt.generate_pair(&user)?,
            user: UserView::from(&user),
            organization,
        })
    }

    /// Verify a token of `expected` type and load its still-valid user
    async fn resolve_user(&self, authorization: Option<&str>, expected: TokenType) -> Result<UserDoc> {
        let token = extract_token_from_header(authorization)
            .ok_or_else(|| IbError::Unauthorized("No token provided".into()))?;
        let claims = self.jwt.verify_token(token, expected).into_claims()?;

        let user = self
            .stores
            .users
            .find_one(doc! { "id": &claims.user_id, "org_id": &claims.org_id })
            .await?
            .ok_or_else(|| IbError::Unauthorized("User no longer exists".into()))?;

        if !user.is_active {
            return Err(IbError::Unauthorized("Account is deactivated".into()));
        }
        if user.token_version != claims.ver {
            return Err(IbError::Unauthorized("Token has been revoked".into()));
        }
        Ok(user)
    }

    /// Resolve the caller from an `Authorization` header value
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthContext> {
        let user = self.resolve_user(authorization, TokenType::Access).await?;
        Ok(AuthContext::from_user(&user))
    }

    pub async fn refresh(&self, authorization: Option<&str>) -> Result<TokenPair> {
        let user = self.resolve_user(authorization, TokenType::Refresh).await?;
        self.jwt.generate_pair(&user)
    }

    /// Revoke every outstanding token for the caller
    pub async fn logout(&self, ctx: &AuthContext) -> Result<()> {
        modify_scoped(self.stores.users.as_ref(), &ctx.org_id, &ctx.user_id, |u| {
            u.token_version += 1;
            Ok(())
        })
        .await?;
        self.audit.record(ctx, "user.logged_out", "user", &ctx.user_id).await;
        Ok(())
    }

    pub async fn me(&self, ctx: &AuthContext) -> Result<MeResponse> {
        let user = get_scoped(self.stores.users.as_ref(), &ctx.org_id, &ctx.user_id).await?;
        Ok(MeResponse {
            user: UserView::from(&user),
            organization: self.load_org(&ctx.org_id).await?,
        })
    }

    /// Change the password and revoke other sessions; returns fresh tokens
    pub async fn change_password(
        &self,
        ctx: &AuthContext,
        req: ChangePasswordRequest,
    ) -> Result<TokenPair> {
        let current = get_scoped(self.stores.users.as_ref(), &ctx.org_id, &ctx.user_id).await?;
        if !verify_password(&req.current_password, &current.password_hash)? {
            return Err(IbError::Unauthorized("Current password is incorrect".into()));
        }
        validate_password_strength(&req.new_password)?;
        if req.new_password == req.current_password {
            return Err(IbError::Validation("New password must differ from the current one".into()));
        }

        let password_hash = hash_password(&req.new_password)?;
        let user = modify_scoped(self.stores.users.as_ref(), &ctx.org_id, &ctx.user_id, |u| {
            u.password_hash = password_hash.clone();
            u.token_version += 1;
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "user.password_changed", "user", &user.id).await;
        self.jwt.generate_pair(&user)
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Create the platform tenant and a super-admin if they do not exist.
    /// Returns the user when one was created.
    pub async fn bootstrap_super_admin(&self, email: &str, password: &str) -> Result<Option<UserDoc>> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(IbError::Config("SUPER_ADMIN_EMAIL is not a valid email".into()));
        }

        let platform = self
            .stores
            .organizations
            .find_one(doc! { "id": PLATFORM_ORG_ID })
            .await?;
        if platform.is_none() {
            self.stores.organizations.insert(OrganizationDoc::platform()).await?;
        }

        if self.email_taken(&email).await? {
            return Ok(None);
        }

        validate_password_strength(password)?;
        let mut user = UserDoc::new(
            PLATFORM_ORG_ID,
            &email,
            "Platform Administrator",
            hash_password(password)?,
            Role::SuperAdmin,
        );
        user.email_verified = true;
        let user = self.stores.users.insert(user).await?;

        info!(user_id = %user.id, "Super-admin bootstrapped");
        self.audit
            .log(AuditEvent::new("user.bootstrapped", "user", &user.id).in_org(PLATFORM_ORG_ID))
            .await;
        Ok(Some(user))
    }
}

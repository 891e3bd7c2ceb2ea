//! Tenancy: accounts, organizations, module guards and the platform view

mod accounts;
mod orgs;
mod platform;

pub use accounts::{
    AccountService, AuthResponse, ChangePasswordRequest, LoginRequest, MeResponse,
    SignupCompleteRequest, SignupResendRequest, SignupStartRequest, SignupStarted,
    SignupVerifyRequest,
};
pub use orgs::{
    CreateUserRequest, OrgService, SetActiveRequest, SetRoleRequest, SetSolutionsRequest,
    UpdateOrgRequest,
};
pub use platform::{PlatformService, PlatformStats, SetOrgStatusRequest};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::{AuthContext, Role};
use crate::db::schemas::{OrganizationDoc, Solution, UserDoc};
use crate::db::{get_scoped, Stores};
use crate::types::{IbError, Result};

/// Active user of `org_id`; the id must not leak across tenants
pub async fn ensure_member(stores: &Stores, org_id: &str, user_id: &str) -> Result<UserDoc> {
    let user = get_scoped(stores.users.as_ref(), org_id, user_id).await?;
    if !user.is_active {
        return Err(IbError::Validation(format!("User '{}' is deactivated", user.id)));
    }
    Ok(user)
}

/// Refuse module access for non-operational tenants or disabled solutions
pub fn check_org_access(org: &OrganizationDoc, solution: Option<Solution>) -> Result<()> {
    if !org.status.is_operational() {
        return Err(IbError::Denied {
            code: "ORG_SUSPENDED",
            message: format!("Organization is {}", org.status),
        });
    }
    if let Some(solution) = solution {
        if !org.solutions.is_enabled(solution) {
            return Err(IbError::Denied {
                code: "SOLUTION_DISABLED",
                message: format!("The {solution} solution is not enabled for this organization"),
            });
        }
    }
    Ok(())
}

/// Load the caller's organization and apply `check_org_access`
pub async fn guard(
    stores: &Stores,
    ctx: &AuthContext,
    solution: Option<Solution>,
) -> Result<OrganizationDoc> {
    let org = get_scoped(stores.organizations.as_ref(), &ctx.org_id, &ctx.org_id).await?;
    check_org_access(&org, solution)?;
    Ok(org)
}

/// User as returned over the API (no credentials)
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: String,
    pub org_id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&UserDoc> for UserView {
    fn from(user: &UserDoc) -> Self {
        Self {
            id: user.id.clone(),
            org_id: user.org_id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            is_active: user.is_active,
            email_verified: user.email_verified,
            last_login_at: user.last_login_at,
            created_at: user.metadata.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{OrgStatus, Solutions};

    #[test]
    fn test_org_access_codes() {
        let mut org = OrganizationDoc::new("Acme", None, None, Solutions::from_list(&[Solution::Finance]));
        assert!(check_org_access(&org, Some(Solution::Finance)).is_ok());

        match check_org_access(&org, Some(Solution::Commerce)) {
            Err(IbError::Denied { code, .. }) => assert_eq!(code, "SOLUTION_DISABLED"),
            other => panic!("unexpected {other:?}"),
        }

        org.status = OrgStatus::Suspended;
        match check_org_access(&org, None) {
            Err(IbError::Denied { code, .. }) => assert_eq!(code, "ORG_SUSPENDED"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ensure_member_is_tenant_scoped() {
        let stores = Stores::memory();
        let user = stores
            .users
            .insert(UserDoc::new("org-a", "a@x.io", "A", String::new(), Role::Member))
            .await
            .unwrap();

        assert!(ensure_member(&stores, "org-a", &user.id).await.is_ok());
        assert!(matches!(
            ensure_member(&stores, "org-b", &user.id).await,
            Err(IbError::NotFound(_))
        ));
    }
}

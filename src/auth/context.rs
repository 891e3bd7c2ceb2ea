//! Authenticated caller for a request

use serde::Serialize;

use crate::auth::{Capability, Role};
use crate::db::schemas::UserDoc;
use crate::types::IbError;

/// Who is calling, resolved from a verified access token and the stored user
#[derive(Debug, Clone, Serialize)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub org_id: String,
    pub role: Role,
}

impl AuthContext {
    pub fn from_user(user: &UserDoc) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            org_id: user.org_id.clone(),
            role: user.role,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.has(capability)
    }
}

/// Fail with 403 unless the caller holds `capability`
pub fn require(ctx: &AuthContext, capability: Capability) -> Result<(), IbError> {
    if ctx.can(capability) {
        Ok(())
    } else {
        Err(IbError::Forbidden(format!(
            "Role '{}' lacks the '{}' capability",
            ctx.role, capability
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require() {
        let user = UserDoc::new("org-1", "a@x.io", "A", String::new(), Role::Accountant);
        let ctx = AuthContext::from_user(&user);

        assert!(require(&ctx, Capability::FinanceWrite).is_ok());
        let err = require(&ctx, Capability::FinancePost).unwrap_err();
        assert_eq!(err.status_code(), hyper::StatusCode::FORBIDDEN);
        assert!(err.to_string().contains("finance_post"));
    }
}

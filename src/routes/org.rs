//! /api/org: the caller's organization and its users

use hyper::Method;

use super::common::{created, method_not_allowed, not_found, ok, session, ApiRequest, ApiResponse};
use crate::auth::Capability;
use crate::server::AppState;
use crate::tenancy::{
    CreateUserRequest, SetActiveRequest, SetRoleRequest, SetSolutionsRequest, UpdateOrgRequest,
};
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, path: &[&str]) -> Result<ApiResponse> {
    let orgs = &state.orgs;

    match path {
        [] => match req.method {
            Method::GET => {
                let ctx = session(state, req, None, Capability::Workspace).await?;
                ok(&orgs.get_org(&ctx).await?)
            }
            Method::PATCH | Method::PUT => {
                let ctx = session(state, req, None, Capability::ManageOrg).await?;
                ok(&orgs.update_org(&ctx, req.json::<UpdateOrgRequest>()?).await?)
            }
            _ => method_not_allowed(),
        },

        ["solutions"] => match req.method {
            Method::PUT | Method::PATCH => {
                let ctx = session(state, req, None, Capability::ManageOrg).await?;
                ok(&orgs.set_solutions(&ctx, req.json::<SetSolutionsRequest>()?).await?)
            }
            _ => method_not_allowed(),
        },

        ["users"] => {
            let ctx = session(state, req, None, Capability::ManageUsers).await?;
            match req.method {
                Method::GET => ok(&orgs.list_users(&ctx).await?),
                Method::POST => created(&orgs.create_user(&ctx, req.json::<CreateUserRequest>()?).await?),
                _ => method_not_allowed(),
            }
        }

        ["users", id, "role"] => match req.method {
            Method::PUT => {
                let ctx = session(state, req, None, Capability::ManageUsers).await?;
                ok(&orgs.set_role(&ctx, id, req.json::<SetRoleRequest>()?).await?)
            }
            _ => method_not_allowed(),
        },

        ["users", id, "active"] => match req.method {
            Method::PUT => {
                let ctx = session(state, req, None, Capability::ManageUsers).await?;
                ok(&orgs.set_active(&ctx, id, req.json::<SetActiveRequest>()?).await?)
            }
            _ => method_not_allowed(),
        },

        _ => not_found(&req.path),
    }
}

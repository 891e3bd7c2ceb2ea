//! /api/admin: super-admin view over every tenant

use hyper::Method;

use super::common::{method_not_allowed, not_found, ok, session, ApiRequest, ApiResponse, StatusQuery};
use crate::auth::Capability;
use crate::db::schemas::OrgStatus;
use crate::server::AppState;
use crate::tenancy::SetOrgStatusRequest;
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, path: &[&str]) -> Result<ApiResponse> {
    let platform = &state.platform;

    match path {
        ["orgs"] => match req.method {
            Method::GET => {
                session(state, req, None, Capability::PlatformAdmin).await?;
                let query: StatusQuery<OrgStatus> = req.query()?;
                ok(&platform.list_orgs(query.status).await?)
            }
            _ => method_not_allowed(),
        },

        ["orgs", id, "status"] => match req.method {
            Method::PUT => {
                let ctx = session(state, req, None, Capability::PlatformAdmin).await?;
                ok(&platform.set_org_status(&ctx, id, req.json::<SetOrgStatusRequest>()?).await?)
            }
            _ => method_not_allowed(),
        },

        ["stats"] => match req.method {
            Method::GET => {
                session(state, req, None, Capability::PlatformAdmin).await?;
                ok(&platform.platform_stats().await?)
            }
            _ => method_not_allowed(),
        },

        _ => not_found(&req.path),
    }
}

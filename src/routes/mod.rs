//! HTTP routes for ibops
//!
//! `dispatch` owns the top-level table; each module matches the path
//! segments under its `/api/<area>` prefix and answers 405 for known paths
//! hit with the wrong method.

mod admin;
mod auth;
mod commerce;
mod common;
mod finance;
mod health;
mod org;
mod workspace;

pub use common::{
    cors_preflight, error_response, json_response, ApiRequest, ApiResponse, StatusQuery,
};

use hyper::Method;

use crate::server::AppState;

/// Route a buffered request; never fails, errors become JSON responses
pub async fn dispatch(state: &AppState, req: ApiRequest) -> ApiResponse {
    if req.method == Method::OPTIONS {
        return cors_preflight();
    }

    let path = req.path.clone();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let result = match segments.as_slice() {
        ["health"] | ["healthz"] => health::health_check(state, &req),
        ["ready"] | ["readyz"] => health::readiness_check(state, &req).await,
        ["version"] => health::version_info(&req),
        ["api", "auth", rest @ ..] => auth::handle(state, &req, rest).await,
        ["api", "org", rest @ ..] => org::handle(state, &req, rest).await,
        ["api", "admin", rest @ ..] => admin::handle(state, &req, rest).await,
        ["api", "commerce", rest @ ..] => commerce::handle(state, &req, rest).await,
        ["api", "finance", rest @ ..] => finance::handle(state, &req, rest).await,
        ["api", "workspace", rest @ ..] => workspace::handle(state, &req, rest).await,
        _ => common::not_found(&req.path),
    };

    result.unwrap_or_else(error_response)
}

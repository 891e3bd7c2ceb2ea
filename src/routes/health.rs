//! Health check endpoints
//!
//! - /health, /healthz - Liveness probe (is the service running?)
//! - /ready, /readyz - Readiness probe (can the service reach its store?)
//! - /version - build information for deployment verification

use hyper::{Method, StatusCode};
use serde::Serialize;

use super::common::{json_response, method_not_allowed, ApiRequest, ApiResponse};
use crate::server::AppState;
use crate::types::Result;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    /// `development` or `production`
    pub mode: &'static str,
    /// `mongodb` or `memory`
    pub store: &'static str,
    pub pending_signups: usize,
}

fn build_health_response(state: &AppState, healthy: bool) -> HealthResponse {
    HealthResponse {
        healthy,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode { "development" } else { "production" },
        store: if state.mongo.is_some() { "mongodb" } else { "memory" },
        pending_signups: state.signups.len(),
    }
}

/// Liveness: always 200 while the process serves requests
pub fn health_check(state: &AppState, req: &ApiRequest) -> Result<ApiResponse> {
    if req.method != Method::GET {
        return method_not_allowed();
    }
    Ok(json_response(StatusCode::OK, &build_health_response(state, true)))
}

/// Readiness: 503 when MongoDB is configured but does not answer a ping
pub async fn readiness_check(state: &AppState, req: &ApiRequest) -> Result<ApiResponse> {
    if req.method != Method::GET {
        return method_not_allowed();
    }
    let ready = match &state.mongo {
        Some(mongo) => mongo.ping().await,
        None => true,
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok(json_response(status, &build_health_response(state, ready)))
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    /// Cargo profile the binary was built with (debug or release)
    pub profile: &'static str,
    pub service: &'static str,
}

pub fn version_info(req: &ApiRequest) -> Result<ApiResponse> {
    if req.method != Method::GET {
        return method_not_allowed();
    }
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        profile: option_env!("IBOPS_BUILD_PROFILE").unwrap_or("unknown"),
        service: "ibops",
    };
    Ok(json_response(StatusCode::OK, &response))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_probes() {
        let state = state();

        let (status, body) = call(&state, ApiRequest::new(Method::GET, "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
        assert_eq!(body["store"], "memory");

        let (status, _) = call(&state, ApiRequest::new(Method::GET, "/readyz")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&state, ApiRequest::new(Method::GET, "/version")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "ibops");
        assert!(body["profile"].is_string());

        let (status, _) = call(&state, ApiRequest::new(Method::POST, "/health")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}

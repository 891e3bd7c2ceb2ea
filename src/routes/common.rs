//! Request and response plumbing shared by every route module

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::auth::{require, AuthContext, Capability};
use crate::db::schemas::Solution;
use crate::server::AppState;
use crate::tenancy::guard;
use crate::types::{IbError, Result};

pub type ApiResponse = Response<Full<Bytes>>;

/// A fully buffered request, detached from the connection
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Bytes,
}

impl ApiRequest {
    /// `target` may carry a query string
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            authorization: None,
            body: Bytes::new(),
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {token}"));
        self
    }

    pub fn json_body(mut self, value: serde_json::Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    /// Decode the JSON body; an empty body reads as `{}`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes: &[u8] = if self.body.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &self.body
        };
        serde_json::from_slice(bytes).map_err(|e| IbError::BadRequest(format!("Invalid JSON: {e}")))
    }

    pub fn query<T: DeserializeOwned>(&self) -> Result<T> {
        serde_urlencoded::from_str(self.query.as_deref().unwrap_or(""))
            .map_err(|e| IbError::BadRequest(format!("Invalid query: {e}")))
    }
}

/// `?status=` filter shared by the list endpoints
#[derive(Debug, Deserialize)]
pub struct StatusQuery<S> {
    pub status: Option<S>,
}

// =============================================================================
// Response Helpers
// =============================================================================

fn with_cors(mut response: ApiResponse) -> ApiResponse {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

fn raw_json(status: StatusCode, body: String) -> ApiResponse {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    with_cors(response)
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> ApiResponse {
    match serde_json::to_string(body) {
        Ok(json) => raw_json(status, json),
        Err(e) => error_response(IbError::Internal(format!("Failed to serialize response: {e}"))),
    }
}

pub fn ok<T: Serialize>(body: &T) -> Result<ApiResponse> {
    Ok(json_response(StatusCode::OK, body))
}

pub fn created<T: Serialize>(body: &T) -> Result<ApiResponse> {
    Ok(json_response(StatusCode::CREATED, body))
}

pub fn error_response(err: IbError) -> ApiResponse {
    if err.status_code().is_server_error() {
        error!("Request failed: {}", err);
    } else {
        debug!("Request rejected: {}", err);
    }
    let (status, body) = err.into_status_code_and_body();
    raw_json(status, body)
}

pub fn cors_preflight() -> ApiResponse {
    let mut response = with_cors(Response::new(Full::new(Bytes::new())));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

pub fn not_found(path: &str) -> Result<ApiResponse> {
    Ok(json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": format!("No route for {path}"), "code": "NOT_FOUND" }),
    ))
}

pub fn method_not_allowed() -> Result<ApiResponse> {
    Ok(json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed", "code": "METHOD_NOT_ALLOWED" }),
    ))
}

// =============================================================================
// Access
// =============================================================================

/// Authenticate, check the tenant may use `solution`, then the capability
pub async fn session(
    state: &AppState,
    req: &ApiRequest,
    solution: Option<Solution>,
    capability: Capability,
) -> Result<AuthContext> {
    let ctx = state.accounts.authenticate(req.authorization()).await?;
    guard(&state.stores, &ctx, solution).await?;
    require(&ctx, capability)?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parsing() {
        let req = ApiRequest::new(Method::GET, "/api/commerce/leads?status=active&stage=intake");
        assert_eq!(req.path, "/api/commerce/leads");

        let filter: crate::commerce::LeadFilter = req.query().unwrap();
        assert_eq!(filter.status, Some(crate::db::schemas::LeadStatus::Active));
        assert_eq!(filter.stage, Some(crate::db::schemas::LeadStage::Intake));

        let empty: crate::commerce::AdvanceLeadRequest = req.json().unwrap();
        assert!(!empty.force);

        let bad = ApiRequest::new(Method::POST, "/x").json_body(serde_json::json!([1]));
        assert!(bad.json::<crate::commerce::AdvanceLeadRequest>().is_err());
    }

    #[test]
    fn test_error_body_shape() {
        let response = error_response(IbError::Gate("need enrichment".into()));
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}

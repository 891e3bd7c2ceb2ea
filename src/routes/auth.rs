//! /api/auth: signup, login, token refresh, logout, profile, password change
//!
//! Only `logout`, `me` and `change-password` need an access token. These
//! routes skip the organization guard so users of a suspended tenant can
//! still see who they are.

use hyper::Method;

use super::common::{created, method_not_allowed, not_found, ok, ApiRequest, ApiResponse};
use crate::server::AppState;
use crate::tenancy::{
    ChangePasswordRequest, LoginRequest, SignupCompleteRequest, SignupResendRequest,
    SignupStartRequest, SignupVerifyRequest,
};
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, path: &[&str]) -> Result<ApiResponse> {
    let accounts = &state.accounts;

    match path {
        ["signup", step] => {
            if req.method != Method::POST {
                return method_not_allowed();
            }
            match *step {
                "start" => ok(&accounts.signup_start(req.json::<SignupStartRequest>()?).await?),
                "resend" => ok(&accounts.signup_resend(req.json::<SignupResendRequest>()?).await?),
                "verify" => ok(&accounts.signup_verify(req.json::<SignupVerifyRequest>()?).await?),
                "complete" => {
                    created(&accounts.signup_complete(req.json::<SignupCompleteRequest>()?).await?)
                }
                _ => not_found(&req.path),
            }
        }

        ["login"] => match req.method {
            Method::POST => ok(&accounts.login(req.json::<LoginRequest>()?).await?),
            _ => method_not_allowed(),
        },

        ["refresh"] => match req.method {
            Method::POST => ok(&accounts.refresh(req.authorization()).await?),
            _ => method_not_allowed(),
        },

        ["logout"] => match req.method {
            Method::POST => {
                let ctx = accounts.authenticate(req.authorization()).await?;
                accounts.logout(&ctx).await?;
                ok(&serde_json::json!({ "success": true }))
            }
            _ => method_not_allowed(),
        },

        ["me"] => match req.method {
            Method::GET => {
                let ctx = accounts.authenticate(req.authorization()).await?;
                ok(&accounts.me(&ctx).await?)
            }
            _ => method_not_allowed(),
        },

        ["change-password"] => match req.method {
            Method::POST => {
                let ctx = accounts.authenticate(req.authorization()).await?;
                let body = req.json::<ChangePasswordRequest>()?;
                ok(&accounts.change_password(&ctx, body).await?)
            }
            _ => method_not_allowed(),
        },

        _ => not_found(&req.path),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use hyper::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_signup_login_refresh_logout() {
        let state = state();
        let token = signup(&state, "founder@acme.io", "Acme").await;

        let (status, me) = call(&state, ApiRequest::new(Method::GET, "/api/auth/me").bearer(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["user"]["role"], "org_admin");
        assert_eq!(me["organization"]["status"], "trial");
        assert!(me["user"].get("password_hash").is_none());

        let (status, body) = call(
            &state,
            ApiRequest::new(Method::POST, "/api/auth/login")
                .json_body(json!({ "email": "founder@acme.io", "password": "wrong-pass1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized: Invalid credentials");

        let (status, login) = call(
            &state,
            ApiRequest::new(Method::POST, "/api/auth/login")
                .json_body(json!({ "email": "FOUNDER@acme.io", "password": "s3cretpass" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let refresh = login["refresh_token"].as_str().unwrap().to_string();
        let access = login["access_token"].as_str().unwrap().to_string();

        // an access token is not a refresh token
        let (status, _) = call(&state, ApiRequest::new(Method::POST, "/api/auth/refresh").bearer(&access)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, pair) = call(&state, ApiRequest::new(Method::POST, "/api/auth/refresh").bearer(&refresh)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(pair["access_token"].is_string());

        let (status, _) = call(&state, ApiRequest::new(Method::POST, "/api/auth/logout").bearer(&access)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&state, ApiRequest::new(Method::POST, "/api/auth/refresh").bearer(&refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signup_rejects_taken_email_and_reused_session() {
        let state = state();
        signup(&state, "owner@acme.io", "Acme").await;

        let (status, body) = call(
            &state,
            ApiRequest::new(Method::POST, "/api/auth/signup/start").json_body(json!({
                "email": "owner@acme.io",
                "password": "s3cretpass",
                "full_name": "Again",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        let (status, _) = call(
            &state,
            ApiRequest::new(Method::POST, "/api/auth/signup/complete")
                .json_body(json!({ "session_id": "signup_missing", "company_name": "X" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

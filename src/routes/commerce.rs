//! /api/commerce: lead SOP and the evaluate → commit → contract → handoff workflow
//!
//! Reads need `commerce_read`, everything else `commerce_write`. Commit
//! decisions are further restricted by the service to the listed roles.

use hyper::Method;
use serde::Deserialize;

use super::common::{created, method_not_allowed, not_found, ok, session, ApiRequest, ApiResponse, StatusQuery};
use crate::auth::{AuthContext, Capability};
use crate::commerce::{
    AdvanceLeadRequest, AssignLeadRequest, CreateCommitRequest, CreateContractRequest,
    CreateEvaluationRequest, CreateHandoffRequest, CreateLeadRequest, DecisionRequest,
    DisqualifyLeadRequest, EnrichLeadRequest, LeadFilter, LogActivityRequest, SignContractRequest,
    UpdateEvaluationRequest,
};
use crate::db::schemas::{
    CommitStatus, ContractStatus, DealKind, EvaluationStatus, HandoffStatus, Qualification, Solution,
};
use crate::server::AppState;
use crate::types::Result;

#[derive(Debug, Deserialize)]
struct EvaluationQuery {
    kind: Option<DealKind>,
    status: Option<EvaluationStatus>,
}

async fn caller(state: &AppState, req: &ApiRequest) -> Result<AuthContext> {
    let capability = if req.method == Method::GET {
        Capability::CommerceRead
    } else {
        Capability::CommerceWrite
    };
    session(state, req, Some(Solution::Commerce), capability).await
}

pub async fn handle(state: &AppState, req: &ApiRequest, path: &[&str]) -> Result<ApiResponse> {
    match path {
        ["leads", ..] => leads(state, req, &path[1..]).await,
        ["evaluations", ..] | ["commits", ..] | ["contracts", ..] | ["handoffs", ..] | ["pipeline"] => {
            deals(state, req, path).await
        }
        _ => not_found(&req.path),
    }
}

async fn leads(state: &AppState, req: &ApiRequest, path: &[&str]) -> Result<ApiResponse> {
    let service = &state.leads;

    match (path, &req.method) {
        ([], &Method::GET) => {
            let ctx = caller(state, req).await?;
            ok(&service.list_leads(&ctx, req.query::<LeadFilter>()?).await?)
        }
        ([], &Method::POST) => {
            let ctx = caller(state, req).await?;
            created(&service.create_lead(&ctx, req.json::<CreateLeadRequest>()?).await?)
        }
        ([id], &Method::GET) => {
            let ctx = caller(state, req).await?;
            ok(&service.get_lead(&ctx, id).await?)
        }
        ([id, "duplicates"], &Method::GET) => {
            let ctx = caller(state, req).await?;
            ok(&service.duplicates(&ctx, id).await?)
        }
        ([id, "enrich"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.enrich_lead(&ctx, id, req.json::<EnrichLeadRequest>()?).await?)
        }
        ([id, "qualify"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.qualify_lead(&ctx, id, req.json::<Qualification>()?).await?)
        }
        ([id, "score"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.rescore_lead(&ctx, id).await?)
        }
        ([id, "activities"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.log_activity(&ctx, id, req.json::<LogActivityRequest>()?).await?)
        }
        ([id, "assign"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.assign_lead(&ctx, id, req.json::<AssignLeadRequest>()?).await?)
        }
        ([id, "advance"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.advance_lead(&ctx, id, req.json::<AdvanceLeadRequest>()?).await?)
        }
        ([id, "disqualify"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.disqualify_lead(&ctx, id, req.json::<DisqualifyLeadRequest>()?).await?)
        }
        ([] | [_], _)
        | ([_, "duplicates" | "enrich" | "qualify" | "score" | "activities" | "assign" | "advance" | "disqualify"], _) => {
            method_not_allowed()
        }
        _ => not_found(&req.path),
    }
}

async fn deals(state: &AppState, req: &ApiRequest, path: &[&str]) -> Result<ApiResponse> {
    let service = &state.deals;

    match (path, &req.method) {
        // Evaluations
        (["evaluations"], &Method::GET) => {
            let ctx = caller(state, req).await?;
            let query: EvaluationQuery = req.query()?;
            ok(&service.list_evaluations(&ctx, query.kind, query.status).await?)
        }
        (["evaluations"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            created(&service.create_evaluation(&ctx, req.json::<CreateEvaluationRequest>()?).await?)
        }
        (["evaluations", id], &Method::GET) => {
            let ctx = caller(state, req).await?;
            ok(&service.get_evaluation(&ctx, id).await?)
        }
        (["evaluations", id], &Method::PATCH) => {
            let ctx = caller(state, req).await?;
            ok(&service.update_evaluation(&ctx, id, req.json::<UpdateEvaluationRequest>()?).await?)
        }
        (["evaluations", id, "submit"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.submit_evaluation(&ctx, id).await?)
        }

        // Commits
        (["commits"], &Method::GET) => {
            let ctx = caller(state, req).await?;
            let query: StatusQuery<CommitStatus> = req.query()?;
            ok(&service.list_commits(&ctx, query.status).await?)
        }
        (["commits"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            created(&service.create_commit(&ctx, req.json::<CreateCommitRequest>()?).await?)
        }
        (["commits", id], &Method::GET) => {
            let ctx = caller(state, req).await?;
            ok(&service.get_commit(&ctx, id).await?)
        }
        (["commits", id, "decision"], &Method::POST) => {
            // approvers such as legal or the finance head only hold commerce_read
            let ctx = session(state, req, Some(Solution::Commerce), Capability::CommerceRead).await?;
            ok(&service.decide_commit(&ctx, id, req.json::<DecisionRequest>()?).await?)
        }

        // Contracts
        (["contracts"], &Method::GET) => {
            let ctx = caller(state, req).await?;
            let query: StatusQuery<ContractStatus> = req.query()?;
            ok(&service.list_contracts(&ctx, query.status).await?)
        }
        (["contracts"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            created(&service.create_contract(&ctx, req.json::<CreateContractRequest>()?).await?)
        }
        (["contracts", id], &Method::GET) => {
            let ctx = caller(state, req).await?;
            ok(&service.get_contract(&ctx, id).await?)
        }
        (["contracts", id, "send"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.send_contract(&ctx, id).await?)
        }
        (["contracts", id, "sign"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.sign_contract(&ctx, id, req.json::<SignContractRequest>()?).await?)
        }
        (["contracts", id, "cancel"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.cancel_contract(&ctx, id).await?)
        }

        // Handoffs
        (["handoffs"], &Method::GET) => {
            let ctx = caller(state, req).await?;
            let query: StatusQuery<HandoffStatus> = req.query()?;
            ok(&service.list_handoffs(&ctx, query.status).await?)
        }
        (["handoffs"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            created(&service.create_handoff(&ctx, req.json::<CreateHandoffRequest>()?).await?)
        }
        (["handoffs", id], &Method::GET) => {
            let ctx = caller(state, req).await?;
            ok(&service.get_handoff(&ctx, id).await?)
        }
        (["handoffs", id, "accept"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.accept_handoff(&ctx, id).await?)
        }
        (["handoffs", id, "complete"], &Method::POST) => {
            let ctx = caller(state, req).await?;
            ok(&service.complete_handoff(&ctx, id).await?)
        }

        (["pipeline"], &Method::GET) => {
            let ctx = caller(state, req).await?;
            ok(&service.pipeline_summary(&ctx).await?)
        }

        (["evaluations" | "commits" | "contracts" | "handoffs"] | ["pipeline"], _)
        | (["evaluations" | "commits" | "contracts" | "handoffs", _], _)
        | (["evaluations", _, "submit"], _)
        | (["commits", _, "decision"], _)
        | (["contracts", _, "send" | "sign" | "cancel"], _)
        | (["handoffs", _, "accept" | "complete"], _) => method_not_allowed(),

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
    async fn test_lead_gate_is_reported() {
        let state = state();
        let admin = signup(&state, "owner@acme.io", "Acme").await;

        let (status, lead) = call(
            &state,
            ApiRequest::new(Method::POST, "/api/commerce/leads")
                .bearer(&admin)
                .json_body(json!({ "company_name": "Globex Ltd", "email": "buyer@globex.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(lead["stage"], "intake");
        let id = lead["id"].as_str().unwrap().to_string();

        // intake → enrich is open, enrich → validate needs enrichment
        let advance = format!("/api/commerce/leads/{id}/advance");
        let (status, lead) = call(&state, ApiRequest::new(Method::POST, &advance).bearer(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(lead["stage"], "enrich");

        let (status, body) = call(&state, ApiRequest::new(Method::POST, &advance).bearer(&admin)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "GATE_BLOCKED");

        let (status, body) = call(
            &state,
            ApiRequest::new(Method::POST, "/api/commerce/leads")
                .bearer(&admin)
                .json_body(json!({ "company_name": "Globex", "email": "Buyer@Globex.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT, "{body}");

        let (status, list) = call(
            &state,
            ApiRequest::new(Method::GET, "/api/commerce/leads?stage=enrich").bearer(&admin),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_needs_listed_role() {
        let state = state();
        let admin = signup(&state, "owner@acme.io", "Acme").await;

        let (status, evaluation) = call(
            &state,
            ApiRequest::new(Method::POST, "/api/commerce/evaluations")
                .bearer(&admin)
                .json_body(json!({
                    "kind": "procurement",
                    "counterparty": "Parts Co",
                    "currency": "USD",
                    "line_items": [
                        { "description": "Bolts", "quantity": "100", "unit_price": "2.50", "unit_cost": "2.50" }
                    ],
                })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{evaluation}");
        let id = evaluation["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &state,
            ApiRequest::new(Method::POST, &format!("/api/commerce/evaluations/{id}/submit")).bearer(&admin),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, commit) = call(
            &state,
            ApiRequest::new(Method::POST, "/api/commerce/commits")
                .bearer(&admin)
                .json_body(json!({ "evaluation_id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(commit["status"], "pending_approval");
        assert_eq!(commit["required_roles"], json!(["procurement_manager"]));

        // an org admin is not the procurement manager
        let (status, _) = call(
            &state,
            ApiRequest::new(Method::POST, &format!("/api/commerce/commits/{}/decision", commit["id"].as_str().unwrap()))
                .bearer(&admin)
                .json_body(json!({ "decision": "approve" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, summary) = call(&state, ApiRequest::new(Method::GET, "/api/commerce/pipeline").bearer(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["commits"]["pending_approval"], 1);
    }
}

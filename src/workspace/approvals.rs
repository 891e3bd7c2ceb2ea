//! General-purpose approval requests

use bson::doc;
use chrono::Utc;
use serde::Deserialize;

use super::WorkspaceService;
use crate::auth::AuthContext;
use crate::commerce::DecisionRequest;
use crate::db::schemas::{ApprovalRequestDoc, ApprovalRequestStatus, ApproverDecision, Decision, Metadata};
use crate::db::{get_scoped, modify_scoped};
use crate::logging::AuditEvent;
use crate::tenancy::ensure_member;
use crate::types::{IbError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApprovalRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub approver_ids: Vec<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

impl WorkspaceService {
    pub async fn create_approval_request(
        &self,
        ctx: &AuthContext,
        req: CreateApprovalRequest,
    ) -> Result<ApprovalRequestDoc> {
        let title = req.title.trim().to_string();
        if title.is_empty() {
            return Err(IbError::Validation("title is required".into()));
        }

        let mut approver_ids: Vec<String> = Vec::with_capacity(req.approver_ids.len());
        for id in req.approver_ids {
            if !approver_ids.contains(&id) {
                approver_ids.push(id);
            }
        }
        if approver_ids.is_empty() {
            return Err(IbError::Validation("at least one approver is required".into()));
        }
        for id in &approver_ids {
            ensure_member(&self.stores, &ctx.org_id, id).await?;
        }

        let request = ApprovalRequestDoc {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            title,
            description: req.description.filter(|d| !d.trim().is_empty()),
            approver_ids,
            decisions: Vec::new(),
            reference: req.reference,
            status: ApprovalRequestStatus::Pending,
            requested_by: ctx.user_id.clone(),
        };

        let request = self.stores.approval_requests.insert(request).await?;
        for approver in &request.approver_ids {
            self.notify(
                &request.org_id,
                approver,
                "Approval requested",
                &request.title,
                format!("approval:{}", request.id),
            )
            .await;
        }
        self.audit.record(ctx, "approval.requested", "approval request", &request.id).await;
        Ok(request)
    }

    /// Any rejection rejects; approval needs every listed approver
    pub async fn decide_approval_request(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: DecisionRequest,
    ) -> Result<ApprovalRequestDoc> {
        let request = modify_scoped(self.stores.approval_requests.as_ref(), &ctx.org_id, id, |r| {
            if r.status != ApprovalRequestStatus::Pending {
                return Err(IbError::Conflict(format!("Request is already {}", r.status)));
            }
            if !r.approver_ids.contains(&ctx.user_id) {
                return Err(IbError::Forbidden("You are not an approver on this request".into()));
            }
            if r.decisions.iter().any(|d| d.user_id == ctx.user_id) {
                return Err(IbError::Conflict("You have already decided".into()));
            }

            r.decisions.push(ApproverDecision {
                user_id: ctx.user_id.clone(),
                decision: req.decision,
                comment: req.comment.clone(),
                decided_at: Utc::now(),
            });

            if req.decision == Decision::Reject {
                r.status = ApprovalRequestStatus::Rejected;
            } else if r
                .approver_ids
                .iter()
                .all(|a| r.decisions.iter().any(|d| &d.user_id == a))
            {
                r.status = ApprovalRequestStatus::Approved;
            }
            Ok(())
        })
        .await?;

        if request.status != ApprovalRequestStatus::Pending {
            self.notify(
                &request.org_id,
                &request.requested_by,
                &format!("Request {}", request.status),
                &request.title,
                format!("approval:{}", request.id),
            )
            .await;
        }
        self.audit
            .log(
                AuditEvent::new("approval.decided", "approval request", &request.id)
                    .by(ctx)
                    .with_detail(serde_json::json!({
                        "decision": req.decision,
                        "status": request.status,
                    })),
            )
            .await;
        Ok(request)
    }

    pub async fn get_approval_request(&self, ctx: &AuthContext, id: &str) -> Result<ApprovalRequestDoc> {
        get_scoped(self.stores.approval_requests.as_ref(), &ctx.org_id, id).await
    }

    /// Requests the caller raised or must decide on
    pub async fn list_approval_requests(
        &self,
        ctx: &AuthContext,
        status: Option<ApprovalRequestStatus>,
    ) -> Result<Vec<ApprovalRequestDoc>> {
        let mut filter = doc! { "org_id": &ctx.org_id };
        if let Some(status) = status {
            filter.insert("status", status);
        }
        let requests = self.stores.approval_requests.find_many(filter).await?;
        Ok(requests
            .into_iter()
            .filter(|r| r.requested_by == ctx.user_id || r.approver_ids.contains(&ctx.user_id))
            .collect())
    }
}

//! /api/workspace: tasks, approval requests, channels and notifications

use hyper::Method;
use serde::Deserialize;

use super::common::{created, method_not_allowed, not_found, ok, session, ApiRequest, ApiResponse, StatusQuery};
use crate::auth::Capability;
use crate::commerce::DecisionRequest;
use crate::db::schemas::{ApprovalRequestStatus, Solution};
use crate::server::AppState;
use crate::types::Result;
use crate::workspace::{
    AddMemberRequest, CreateApprovalRequest, CreateChannelRequest, CreateTaskRequest,
    PostMessageRequest, SetTaskStatusRequest, TaskFilter, UpdateTaskRequest,
};

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct NotificationsQuery {
    #[serde(default)]
    unread_only: bool,
}

pub async fn handle(state: &AppState, req: &ApiRequest, path: &[&str]) -> Result<ApiResponse> {
    let workspace = &state.workspace;

    let known = matches!(
        path,
        ["tasks" | "approvals" | "channels" | "notifications"]
            | ["tasks" | "approvals", _]
            | ["tasks", _, "status"]
            | ["approvals", _, "decision"]
            | ["channels", _, "members" | "messages"]
            | ["notifications", _, "read"]
            | ["notifications", "read-all"]
    );
    if !known {
        return not_found(&req.path);
    }
    let ctx = session(state, req, Some(Solution::Workspace), Capability::Workspace).await?;

    match (path, &req.method) {
        // Tasks
        (["tasks"], &Method::GET) => ok(&workspace.list_tasks(&ctx, req.query::<TaskFilter>()?).await?),
        (["tasks"], &Method::POST) => created(&workspace.create_task(&ctx, req.json::<CreateTaskRequest>()?).await?),
        (["tasks", id], &Method::GET) => ok(&workspace.get_task(&ctx, id).await?),
        (["tasks", id], &Method::PATCH) => {
            ok(&workspace.update_task(&ctx, id, req.json::<UpdateTaskRequest>()?).await?)
        }
        (["tasks", id, "status"], &Method::PUT) => {
            ok(&workspace.set_task_status(&ctx, id, req.json::<SetTaskStatusRequest>()?).await?)
        }

        // Approval requests
        (["approvals"], &Method::GET) => {
            let query: StatusQuery<ApprovalRequestStatus> = req.query()?;
            ok(&workspace.list_approval_requests(&ctx, query.status).await?)
        }
        (["approvals"], &Method::POST) => {
            created(&workspace.create_approval_request(&ctx, req.json::<CreateApprovalRequest>()?).await?)
        }
        (["approvals", id], &Method::GET) => ok(&workspace.get_approval_request(&ctx, id).await?),
        (["approvals", id, "decision"], &Method::POST) => {
            ok(&workspace.decide_approval_request(&ctx, id, req.json::<DecisionRequest>()?).await?)
        }

        // Channels
        (["channels"], &Method::GET) => ok(&workspace.list_channels(&ctx).await?),
        (["channels"], &Method::POST) => {
            created(&workspace.create_channel(&ctx, req.json::<CreateChannelRequest>()?).await?)
        }
        (["channels", id, "members"], &Method::POST) => {
            ok(&workspace.add_channel_member(&ctx, id, req.json::<AddMemberRequest>()?).await?)
        }
        (["channels", id, "messages"], &Method::GET) => {
            let query: MessagesQuery = req.query()?;
            ok(&workspace.list_messages(&ctx, id, query.limit).await?)
        }
        (["channels", id, "messages"], &Method::POST) => {
            created(&workspace.post_message(&ctx, id, req.json::<PostMessageRequest>()?).await?)
        }

        // Notifications
        (["notifications"], &Method::GET) => {
            let query: NotificationsQuery = req.query()?;
            ok(&workspace.list_notifications(&ctx, query.unread_only).await?)
        }
        (["notifications", "read-all"], &Method::POST) => {
            let updated = workspace.mark_all_notifications_read(&ctx).await?;
            ok(&serde_json::json!({ "updated": updated }))
        }
        (["notifications", id, "read"], &Method::POST) => {
            ok(&workspace.mark_notification_read(&ctx, id).await?)
        }

        _ => method_not_allowed(),
    }
}

//! Tasks

use bson::doc;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::WorkspaceService;
use crate::auth::AuthContext;
use crate::db::schemas::{Metadata, TaskDoc, TaskPriority, TaskStatus};
use crate::db::{get_scoped, modify_scoped};
use crate::tenancy::ensure_member;
use crate::types::{IbError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: TaskPriority,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee_id: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTaskStatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub assignee: Option<String>,
    pub status: Option<TaskStatus>,
}

impl WorkspaceService {
    pub async fn create_task(&self, ctx: &AuthContext, req: CreateTaskRequest) -> Result<TaskDoc> {
        let title = req.title.trim().to_string();
        if title.is_empty() {
            return Err(IbError::Validation("title is required".into()));
        }
        if let Some(assignee) = &req.assignee_id {
            ensure_member(&self.stores, &ctx.org_id, assignee).await?;
        }

        let task = TaskDoc {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            title,
            description: req.description.filter(|d| !d.trim().is_empty()),
            assignee_id: req.assignee_id,
            due_date: req.due_date,
            priority: req.priority,
            status: TaskStatus::Todo,
            created_by: ctx.user_id.clone(),
            completed_at: None,
        };

        let task = self.stores.tasks.insert(task).await?;
        if let Some(assignee) = task.assignee_id.as_deref().filter(|a| *a != ctx.user_id) {
            self.notify(&task.org_id, assignee, "Task assigned to you", &task.title, format!("task:{}", task.id))
                .await;
        }
        self.audit.record(ctx, "task.created", "task", &task.id).await;
        Ok(task)
    }

    pub async fn update_task(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: UpdateTaskRequest,
    ) -> Result<TaskDoc> {
        if let Some(assignee) = &req.assignee_id {
            ensure_member(&self.stores, &ctx.org_id, assignee).await?;
        }
        if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(IbError::Validation("title is required".into()));
        }

        let before = get_scoped(self.stores.tasks.as_ref(), &ctx.org_id, id).await?;
        let task = modify_scoped(self.stores.tasks.as_ref(), &ctx.org_id, id, |task| {
            if task.status == TaskStatus::Done {
                return Err(IbError::Conflict("Completed tasks cannot be edited".into()));
            }
            if let Some(title) = &req.title {
                task.title = title.trim().to_string();
            }
            if let Some(description) = &req.description {
                task.description = Some(description.clone()).filter(|d| !d.trim().is_empty());
            }
            if let Some(assignee) = &req.assignee_id {
                task.assignee_id = Some(assignee.clone());
            }
            if let Some(due_date) = req.due_date {
                task.due_date = Some(due_date);
            }
            if let Some(priority) = req.priority {
                task.priority = priority;
            }
            Ok(())
        })
        .await?;

        let reassigned = task.assignee_id.is_some() && task.assignee_id != before.assignee_id;
        if let Some(assignee) = task.assignee_id.as_deref().filter(|a| reassigned && *a != ctx.user_id) {
            self.notify(&task.org_id, assignee, "Task assigned to you", &task.title, format!("task:{}", task.id))
                .await;
        }
        self.audit.record(ctx, "task.updated", "task", &task.id).await;
        Ok(task)
    }

    /// Done is terminal
    pub async fn set_task_status(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: SetTaskStatusRequest,
    ) -> Result<TaskDoc> {
        let task = modify_scoped(self.stores.tasks.as_ref(), &ctx.org_id, id, |task| {
            if task.status == TaskStatus::Done {
                return Err(IbError::Conflict("Task is done and cannot be reopened".into()));
            }
            task.status = req.status;
            if req.status == TaskStatus::Done {
                task.completed_at = Some(Utc::now());
            }
            Ok(())
        })
        .await?;

        if task.status == TaskStatus::Done && task.created_by != ctx.user_id {
            self.notify(&task.org_id, &task.created_by, "Task completed", &task.title, format!("task:{}", task.id))
                .await;
        }
        self.audit.record(ctx, "task.status_changed", "task", &task.id).await;
        Ok(task)
    }

    pub async fn get_task(&self, ctx: &AuthContext, id: &str) -> Result<TaskDoc> {
        get_scoped(self.stores.tasks.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_tasks(&self, ctx: &AuthContext, filter: TaskFilter) -> Result<Vec<TaskDoc>> {
        let mut query = doc! { "org_id": &ctx.org_id };
        if let Some(assignee) = filter.assignee {
            query.insert("assignee_id", assignee);
        }
        if let Some(status) = filter.status {
            query.insert("status", status);
        }
        self.stores.tasks.find_many(query).await
    }
}

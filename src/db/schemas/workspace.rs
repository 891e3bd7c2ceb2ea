//! Workspace schemas: tasks, approval requests, channels, messages,
//! notifications

use bson::{doc, Document};
use chrono::{DateTime, NaiveDate, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::deal::Decision;
use crate::db::schemas::Metadata;

pub const TASK_COLLECTION: &str = "tasks";
pub const APPROVAL_REQUEST_COLLECTION: &str = "approval_requests";
pub const CHANNEL_COLLECTION: &str = "channels";
pub const MESSAGE_COLLECTION: &str = "messages";
pub const NOTIFICATION_COLLECTION: &str = "notifications";

status_enum! {
    pub enum TaskStatus {
        Todo => "todo" | "Todo" | "open",
        InProgress => "in_progress" | "In Progress" | "in-progress",
        Blocked => "blocked" | "Blocked",
        Done => "done" | "Done" | "completed",
    }
}

status_enum! {
    pub enum TaskPriority {
        Low => "low" | "Low",
        Medium => "medium" | "Medium" | "normal",
        High => "high" | "High",
        Urgent => "urgent" | "Urgent",
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

status_enum! {
    pub enum ApprovalRequestStatus {
        Pending => "pending" | "Pending",
        Approved => "approved" | "Approved",
        Rejected => "rejected" | "Rejected",
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl IntoIndexes for TaskDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "org_id": 1, "assignee_id": 1, "status": 1 },
            Some(IndexOptions::builder().name("org_assignee_status_index".to_string()).build()),
        )]
    }
}

impl_record!(TaskDoc, TASK_COLLECTION, "task");

/// An approver's recorded answer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApproverDecision {
    pub user_id: String,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApprovalRequestDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub approver_ids: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<ApproverDecision>,
    /// Free-form pointer to what is being approved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub status: ApprovalRequestStatus,
    pub requested_by: String,
}

impl IntoIndexes for ApprovalRequestDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "org_id": 1, "approver_ids": 1 },
            Some(IndexOptions::builder().name("org_approvers_index".to_string()).build()),
        )]
    }
}

impl_record!(ApprovalRequestDoc, APPROVAL_REQUEST_COLLECTION, "approval request");

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChannelDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub name: String,
    pub member_ids: Vec<String>,
    pub created_by: String,
}

impl IntoIndexes for ChannelDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "org_id": 1, "name": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("org_name_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "org_id": 1, "member_ids": 1 },
                Some(IndexOptions::builder().name("org_members_index".to_string()).build()),
            ),
        ]
    }
}

impl_record!(ChannelDoc, CHANNEL_COLLECTION, "channel");

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MessageDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub body: String,
}

impl IntoIndexes for MessageDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "org_id": 1, "channel_id": 1 },
            Some(IndexOptions::builder().name("org_channel_index".to_string()).build()),
        )]
    }
}

impl_record!(MessageDoc, MESSAGE_COLLECTION, "message");

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NotificationDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Record kind and id the notification points at, e.g. "task:<id>"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub read: bool,
}

impl IntoIndexes for NotificationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "org_id": 1, "user_id": 1, "read": 1 },
            Some(IndexOptions::builder().name("org_user_read_index".to_string()).build()),
        )]
    }
}

impl_record!(NotificationDoc, NOTIFICATION_COLLECTION, "notification");

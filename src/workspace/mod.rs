//! Workspace: tasks, approval requests, channels and notifications

mod approvals;
mod channels;
mod notifications;
mod tasks;

pub use approvals::CreateApprovalRequest;
pub use channels::{AddMemberRequest, CreateChannelRequest, PostMessageRequest, MAX_MESSAGE_CHARS};
pub use tasks::{CreateTaskRequest, SetTaskStatusRequest, TaskFilter, UpdateTaskRequest};

use crate::db::Stores;
use crate::logging::AuditLogger;

#[derive(Clone)]
pub struct WorkspaceService {
    stores: Stores,
    audit: AuditLogger,
}

impl WorkspaceService {
    pub fn new(stores: Stores, audit: AuditLogger) -> Self {
        Self { stores, audit }
    }
}

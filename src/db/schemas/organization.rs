//! Organization (tenant) document schema

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Collection name for organizations
pub const ORGANIZATION_COLLECTION: &str = "organizations";

/// Tenant id reserved for platform operators
pub const PLATFORM_ORG_ID: &str = "platform";

status_enum! {
    /// Subscription state of a tenant
    pub enum OrgStatus {
        Trial => "trial" | "Trial",
        Active => "active" | "Active",
        Suspended => "suspended" | "Suspended",
        Cancelled => "cancelled" | "Cancelled" | "canceled",
    }
}

impl OrgStatus {
    /// Whether the tenant may use module routes
    pub fn is_operational(self) -> bool {
        matches!(self, OrgStatus::Trial | OrgStatus::Active)
    }
}

status_enum! {
    /// Product areas a tenant can switch on
    pub enum Solution {
        Finance => "finance",
        Commerce => "commerce",
        Workspace => "workspace",
    }
}

/// Enabled solution flags
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Solutions {
    #[serde(default)]
    pub finance: bool,
    #[serde(default)]
    pub commerce: bool,
    #[serde(default = "default_true")]
    pub workspace: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Solutions {
    fn default() -> Self {
        Self {
            finance: true,
            commerce: true,
            workspace: true,
        }
    }
}

impl Solutions {
    pub fn is_enabled(&self, solution: Solution) -> bool {
        match solution {
            Solution::Finance => self.finance,
            Solution::Commerce => self.commerce,
            Solution::Workspace => self.workspace,
        }
    }

    /// Build flags from a list; an empty list enables everything
    pub fn from_list(list: &[Solution]) -> Self {
        if list.is_empty() {
            return Self::default();
        }
        Self {
            finance: list.contains(&Solution::Finance),
            commerce: list.contains(&Solution::Commerce),
            workspace: list.contains(&Solution::Workspace),
        }
    }
}

/// Organization document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrganizationDoc {
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    /// Equal to `id`; lets tenant-scoped lookups treat orgs like any record
    pub org_id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    pub status: OrgStatus,

    #[serde(default)]
    pub solutions: Solutions,

    /// User who completed signup
    #[serde(default)]
    pub owner_user_id: String,
}

impl OrganizationDoc {
    pub fn new(name: &str, industry: Option<String>, country: Option<String>, solutions: Solutions) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            org_id: id.clone(),
            id,
            metadata: Metadata::new(),
            name: name.trim().to_string(),
            industry,
            country,
            website: None,
            status: OrgStatus::Trial,
            solutions,
            owner_user_id: String::new(),
        }
    }

    /// The tenant record platform operators belong to
    pub fn platform() -> Self {
        Self {
            id: PLATFORM_ORG_ID.to_string(),
            org_id: PLATFORM_ORG_ID.to_string(),
            metadata: Metadata::new(),
            name: "Platform".to_string(),
            industry: None,
            country: None,
            website: None,
            status: OrgStatus::Active,
            solutions: Solutions::default(),
            owner_user_id: String::new(),
        }
    }
}

impl IntoIndexes for OrganizationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "status": 1 },
            Some(IndexOptions::builder().name("status_index".to_string()).build()),
        )]
    }
}

impl_record!(OrganizationDoc, ORGANIZATION_COLLECTION, "organization");

//! Deal workflow schemas: evaluation, commit, contract, handoff
//!
//! One deal is copied forward stage by stage. Each hop snapshots the figures
//! it was approved on so later edits upstream cannot change what was signed.

use bson::{doc, Document};
use chrono::{DateTime, NaiveDate, Utc};
use mongodb::options::IndexOptions;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

pub const EVALUATION_COLLECTION: &str = "evaluations";
pub const COMMIT_COLLECTION: &str = "commits";
pub const CONTRACT_COLLECTION: &str = "contracts";
pub const HANDOFF_COLLECTION: &str = "handoffs";

status_enum! {
    /// Sell side or buy side
    pub enum DealKind {
        Revenue => "revenue" | "Revenue" | "sales",
        Procurement => "procurement" | "Procurement" | "purchase",
    }
}

status_enum! {
    pub enum EvaluationStatus {
        Draft => "draft" | "Draft",
        Submitted => "submitted" | "Submitted",
        Committed => "committed" | "Committed",
    }
}

status_enum! {
    pub enum CommitStatus {
        PendingApproval => "pending_approval" | "Pending" | "pending",
        Approved => "approved" | "Approved",
        Rejected => "rejected" | "Rejected",
    }
}

status_enum! {
    pub enum ContractStatus {
        Draft => "draft" | "Draft",
        Sent => "sent" | "Sent",
        Signed => "signed" | "Signed",
        Cancelled => "cancelled" | "Cancelled" | "canceled",
    }
}

status_enum! {
    pub enum HandoffStatus {
        Pending => "pending" | "Pending",
        Accepted => "accepted" | "Accepted",
        Completed => "completed" | "Completed",
    }
}

status_enum! {
    pub enum Decision {
        Approve => "approve" | "approved",
        Reject => "reject" | "rejected",
    }
}

/// Priced line on a deal
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DealLine {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub unit_cost: Decimal,
}

/// Weighted risk input, score 0-100
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RiskFactor {
    pub name: String,
    pub score: Decimal,
    #[serde(default = "default_weight")]
    pub weight: Decimal,
}

fn default_weight() -> Decimal {
    Decimal::ONE
}

/// Figures the approval matrix runs on
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct DealFigures {
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub gross_margin_percent: Decimal,
    pub risk_score: Decimal,
}

// =============================================================================
// Evaluation
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EvaluationDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub kind: DealKind,
    /// Converted lead (revenue deals only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    pub counterparty: String,
    pub currency: String,
    pub line_items: Vec<DealLine>,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub figures: DealFigures,
    pub status: EvaluationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl IntoIndexes for EvaluationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "org_id": 1, "status": 1 },
            Some(IndexOptions::builder().name("org_status_index".to_string()).build()),
        )]
    }
}

impl_record!(EvaluationDoc, EVALUATION_COLLECTION, "evaluation");

// =============================================================================
// Commit
// =============================================================================

/// One role's recorded decision on a commit
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApprovalDecision {
    pub role: Role,
    pub user_id: String,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CommitDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub kind: DealKind,
    pub evaluation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    pub counterparty: String,
    pub currency: String,
    pub line_items: Vec<DealLine>,
    pub figures: DealFigures,
    /// Roles that must approve, in approval order
    pub required_roles: Vec<Role>,
    #[serde(default)]
    pub decisions: Vec<ApprovalDecision>,
    pub status: CommitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl CommitDoc {
    /// Required roles that have not decided yet
    pub fn pending_roles(&self) -> Vec<Role> {
        self.required_roles
            .iter()
            .copied()
            .filter(|role| !self.decisions.iter().any(|d| d.role == *role))
            .collect()
    }
}

impl IntoIndexes for CommitDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "org_id": 1, "status": 1 },
                Some(IndexOptions::builder().name("org_status_index".to_string()).build()),
            ),
            (
                doc! { "evaluation_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("evaluation_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl_record!(CommitDoc, COMMIT_COLLECTION, "commit");

// =============================================================================
// Contract
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ContractDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub kind: DealKind,
    pub commit_id: String,
    pub evaluation_id: String,
    pub counterparty: String,
    pub currency: String,
    pub line_items: Vec<DealLine>,
    pub total_value: Decimal,
    pub title: String,
    #[serde(default)]
    pub terms: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ContractStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_id: Option<String>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_by: Option<String>,
}

impl IntoIndexes for ContractDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "commit_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("commit_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl_record!(ContractDoc, CONTRACT_COLLECTION, "contract");

// =============================================================================
// Handoff
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HandoffDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub kind: DealKind,
    pub contract_id: String,
    pub commit_id: String,
    /// User accountable for delivery (revenue) or receipt (procurement)
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: HandoffStatus,
    /// Draft billing created for revenue handoffs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_id: Option<String>,
    /// Pending payable created for procurement handoffs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payable_id: Option<String>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl IntoIndexes for HandoffDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "contract_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("contract_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl_record!(HandoffDoc, HANDOFF_COLLECTION, "handoff");

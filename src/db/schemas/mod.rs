//! Database schemas for ibops
//!
//! Defines the MongoDB document structures for every tenant collection.

pub mod deal;
pub mod finance;
pub mod lead;
mod metadata;
pub mod organization;
pub mod user;
pub mod workspace;

pub use deal::{
    ApprovalDecision, CommitDoc, CommitStatus, ContractDoc, ContractStatus, DealFigures, DealKind,
    DealLine, Decision, EvaluationDoc, EvaluationStatus, HandoffDoc, HandoffStatus, RiskFactor,
};
pub use finance::{
    AssetDoc, AssetStatus, BillingDoc, BillingLine, BillingStatus, JournalEntryDoc, JournalLine,
    JournalStatus, PayableDoc, PayableStatus, Payment, ReceivableDoc, ReceivableStatus, SourceRef,
};
pub use lead::{
    Activity, Enrichment, LeadDoc, LeadScore, LeadStage, LeadStatus, Qualification,
    ScoreBand, ScoreComponent, StageTransition,
};
pub use metadata::Metadata;
pub use organization::{OrgStatus, OrganizationDoc, Solution, Solutions, PLATFORM_ORG_ID};
pub use user::{normalize_email, UserDoc};
pub use workspace::{
    ApprovalRequestDoc, ApprovalRequestStatus, ApproverDecision, ChannelDoc, MessageDoc,
    NotificationDoc, TaskDoc, TaskPriority, TaskStatus,
};

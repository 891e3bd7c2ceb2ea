//! Lead document schema
//!
//! A lead is mutated in place as it walks the nine SOP stages; stage history
//! and an audit trail travel with it.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Collection name for leads
pub const LEAD_COLLECTION: &str = "leads";

status_enum! {
    /// SOP stages in order
    pub enum LeadStage {
        Intake => "intake" | "Lead_Intake_SOP",
        Enrich => "enrich" | "Lead_Enrich_SOP",
        Validate => "validate" | "Lead_Validate_SOP",
        Deduplicate => "deduplicate" | "Lead_Dedupe_SOP",
        Qualify => "qualify" | "Lead_Qualify_SOP",
        Score => "score" | "Lead_Score_SOP",
        Route => "route" | "Lead_Route_SOP",
        Engage => "engage" | "Lead_Engage_SOP",
        Convert => "convert" | "Lead_Convert_SOP",
    }
}

impl LeadStage {
    pub const ORDER: [LeadStage; 9] = [
        LeadStage::Intake,
        LeadStage::Enrich,
        LeadStage::Validate,
        LeadStage::Deduplicate,
        LeadStage::Qualify,
        LeadStage::Score,
        LeadStage::Route,
        LeadStage::Engage,
        LeadStage::Convert,
    ];

    /// Zero-based position in the SOP
    pub fn position(self) -> usize {
        Self::ORDER
            .iter()
            .position(|stage| *stage == self)
            .unwrap_or_default()
    }

    /// Stage that follows this one, `None` for the terminal stage
    pub fn next(self) -> Option<LeadStage> {
        Self::ORDER.get(self.position() + 1).copied()
    }
}

status_enum! {
    pub enum LeadStatus {
        Active => "active" | "Active" | "open",
        Disqualified => "disqualified" | "Disqualified",
        Converted => "converted" | "Converted",
    }
}

status_enum! {
    pub enum ScoreBand {
        Hot => "hot" | "Hot",
        Warm => "warm" | "Warm",
        Cold => "cold" | "Cold",
    }
}

/// Data gathered in the enrich stage
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Enrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_revenue: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub enriched_at: DateTime<Utc>,
    pub enriched_by: String,
}

/// BANT qualification answers
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Qualification {
    pub budget: bool,
    pub authority: bool,
    pub need: bool,
    pub timeline: bool,
}

impl Qualification {
    pub fn answered_yes(&self) -> usize {
        [self.budget, self.authority, self.need, self.timeline]
            .into_iter()
            .filter(|answer| *answer)
            .count()
    }
}

/// One scored factor
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ScoreComponent {
    pub factor: String,
    pub points: u8,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LeadScore {
    pub total: u8,
    pub band: ScoreBand,
    pub components: Vec<ScoreComponent>,
    pub scored_at: DateTime<Utc>,
}

/// Engagement activity (call, email, meeting, ...)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Activity {
    pub kind: String,
    pub summary: String,
    pub by: String,
    pub at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StageTransition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<LeadStage>,
    pub to: LeadStage,
    pub by: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub forced: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LeadAuditEntry {
    pub action: String,
    pub by: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Lead document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LeadDoc {
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub org_id: String,

    pub company_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    /// Where the lead came from (referral, website, event, outbound, manual)
    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub stage: LeadStage,

    pub status: LeadStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification: Option<Qualification>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<LeadScore>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    #[serde(default)]
    pub activities: Vec<Activity>,

    /// Ids of leads flagged as possible duplicates at intake
    #[serde(default)]
    pub possible_duplicates: Vec<String>,

    #[serde(default)]
    pub stage_history: Vec<StageTransition>,

    #[serde(default)]
    pub audit_trail: Vec<LeadAuditEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disqualification_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<DateTime<Utc>>,

    pub created_by: String,
}

fn default_source() -> String {
    "manual".to_string()
}

impl LeadDoc {
    /// Append an audit entry
    pub fn record(&mut self, action: &str, by: &str, detail: Option<String>) {
        self.audit_trail.push(LeadAuditEntry {
            action: action.to_string(),
            by: by.to_string(),
            at: Utc::now(),
            detail,
        });
    }
}

impl IntoIndexes for LeadDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "org_id": 1, "stage": 1 },
                Some(IndexOptions::builder().name("org_stage_index".to_string()).build()),
            ),
            (
                doc! { "org_id": 1, "email": 1 },
                Some(IndexOptions::builder().name("org_email_index".to_string()).build()),
            ),
            (
                doc! { "org_id": 1, "assigned_to": 1 },
                Some(IndexOptions::builder().name("org_assignee_index".to_string()).build()),
            ),
        ]
    }
}

impl_record!(LeadDoc, LEAD_COLLECTION, "lead");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(LeadStage::Intake.next(), Some(LeadStage::Enrich));
        assert_eq!(LeadStage::Engage.next(), Some(LeadStage::Convert));
        assert_eq!(LeadStage::Convert.next(), None);
        assert_eq!(LeadStage::Score.position(), 5);
    }

    #[test]
    fn test_legacy_sop_names_accepted() {
        let stage: LeadStage = serde_json::from_str("\"Lead_Enrich_SOP\"").unwrap();
        assert_eq!(stage, LeadStage::Enrich);
        assert_eq!("Lead_Intake_SOP".parse::<LeadStage>().unwrap(), LeadStage::Intake);
    }

    #[test]
    fn test_bant_count() {
        let q = Qualification {
            budget: true,
            authority: false,
            need: true,
            timeline: true,
        };
        assert_eq!(q.answered_yes(), 3);
    }
}

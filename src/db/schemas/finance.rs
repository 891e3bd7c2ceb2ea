//! Finance schemas: billing, receivable, payable, journal entry, asset
//!
//! Amounts are `Decimal` and serialize as strings so MongoDB never sees a
//! binary float.

use bson::{doc, Document};
use chrono::{DateTime, NaiveDate, Utc};
use mongodb::options::IndexOptions;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

pub const BILLING_COLLECTION: &str = "billings";
pub const RECEIVABLE_COLLECTION: &str = "receivables";
pub const PAYABLE_COLLECTION: &str = "payables";
pub const JOURNAL_COLLECTION: &str = "journal_entries";
pub const ASSET_COLLECTION: &str = "assets";

status_enum! {
    pub enum BillingStatus {
        Draft => "draft" | "Draft",
        Approved => "approved" | "Approved",
        Issued => "issued" | "Issued",
        Paid => "paid" | "Paid",
        Cancelled => "cancelled" | "Cancelled" | "canceled",
    }
}

status_enum! {
    pub enum ReceivableStatus {
        Open => "open" | "Open" | "outstanding",
        PartiallyPaid => "partially_paid" | "Partially Paid" | "partial",
        Paid => "paid" | "Paid",
    }
}

status_enum! {
    pub enum PayableStatus {
        Pending => "pending" | "Pending",
        Approved => "approved" | "Approved",
        PartiallyPaid => "partially_paid" | "Partially Paid" | "partial",
        Paid => "paid" | "Paid",
    }
}

status_enum! {
    pub enum JournalStatus {
        Draft => "draft" | "Draft",
        Posted => "posted" | "Posted",
        Reversed => "reversed" | "Reversed",
    }
}

status_enum! {
    pub enum AssetStatus {
        Active => "active" | "Active",
        Disposed => "disposed" | "Disposed",
    }
}

/// Record that caused a finance document to exist (a handoff, a billing...)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SourceRef {
    pub kind: String,
    pub id: String,
}

impl SourceRef {
    pub fn new(kind: &str, id: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }
}

/// Payment applied to a receivable or payable
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Payment {
    pub amount: Decimal,
    pub paid_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub journal_entry_id: String,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Billing
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BillingLine {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
    /// quantity x unit_price, rounded
    pub amount: Decimal,
    /// amount x tax_rate / 100, rounded
    pub tax: Decimal,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BillingDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    /// Human-facing invoice number
    pub number: String,
    pub customer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    pub currency: String,
    pub due_date: NaiveDate,
    pub lines: Vec<BillingLine>,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub status: BillingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receivable_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_entry_id: Option<String>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_on: Option<NaiveDate>,
}

impl IntoIndexes for BillingDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "org_id": 1, "status": 1 },
                Some(IndexOptions::builder().name("org_status_index".to_string()).build()),
            ),
            (
                doc! { "org_id": 1, "number": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("org_number_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl_record!(BillingDoc, BILLING_COLLECTION, "billing");

// =============================================================================
// Receivable
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReceivableDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub billing_id: String,
    pub customer_name: String,
    pub currency: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub outstanding: Decimal,
    pub status: ReceivableStatus,
    #[serde(default)]
    pub payments: Vec<Payment>,
}

impl IntoIndexes for ReceivableDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "org_id": 1, "status": 1 },
                Some(IndexOptions::builder().name("org_status_index".to_string()).build()),
            ),
            (
                doc! { "billing_id": 1 },
                Some(IndexOptions::builder().name("billing_index".to_string()).build()),
            ),
        ]
    }
}

impl_record!(ReceivableDoc, RECEIVABLE_COLLECTION, "receivable");

// =============================================================================
// Payable
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PayableDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub vendor_name: String,
    pub currency: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub outstanding: Decimal,
    pub status: PayableStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// Expense recognition entry posted on approval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_entry_id: Option<String>,
    pub created_by: String,
}

impl IntoIndexes for PayableDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "org_id": 1, "status": 1 },
            Some(IndexOptions::builder().name("org_status_index".to_string()).build()),
        )]
    }
}

impl_record!(PayableDoc, PAYABLE_COLLECTION, "payable");

// =============================================================================
// Journal entry
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct JournalLine {
    pub account_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub debit: Decimal,
    #[serde(default)]
    pub credit: Decimal,
}

impl JournalLine {
    pub fn debit(account_code: &str, amount: Decimal) -> Self {
        Self {
            account_code: account_code.to_string(),
            description: None,
            debit: amount,
            credit: Decimal::ZERO,
        }
    }

    pub fn credit(account_code: &str, amount: Decimal) -> Self {
        Self {
            account_code: account_code.to_string(),
            description: None,
            debit: Decimal::ZERO,
            credit: amount,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JournalEntryDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub date: NaiveDate,
    pub description: String,
    pub lines: Vec<JournalLine>,
    pub status: JournalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    /// Set on the mirror entry created by a reversal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversal_of: Option<String>,
    /// Set on the original once it has been reversed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversed_by: Option<String>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
}

impl IntoIndexes for JournalEntryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "org_id": 1, "status": 1, "date": 1 },
            Some(IndexOptions::builder().name("org_status_date_index".to_string()).build()),
        )]
    }
}

impl_record!(JournalEntryDoc, JOURNAL_COLLECTION, "journal entry");

// =============================================================================
// Asset
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssetDoc {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub org_id: String,
    pub name: String,
    pub category: String,
    pub cost: Decimal,
    #[serde(default)]
    pub salvage_value: Decimal,
    pub useful_life_months: u32,
    pub acquired_on: NaiveDate,
    pub status: AssetStatus,
    pub created_by: String,
}

impl IntoIndexes for AssetDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "org_id": 1, "category": 1 },
            Some(IndexOptions::builder().name("org_category_index".to_string()).build()),
        )]
    }
}

impl_record!(AssetDoc, ASSET_COLLECTION, "asset");

//! IB Finance: billing, receivables, payables, journal, assets, tax
//!
//! Status transitions claim the record first (versioned write) and only then
//! create the documents they link to, so a lost race never double-posts.

mod assets;
mod billing;
pub mod depreciation;
mod journal;
pub mod ledger;
pub mod money;
mod payables;

pub use assets::{CreateAssetRequest, TaxBucket, TaxSummary};
pub use billing::{BillingLineInput, CreateBillingRequest, PaymentRequest, UpdateBillingRequest};
pub use journal::JournalEntryRequest;
pub use payables::CreatePayableRequest;

use crate::db::Stores;
use crate::logging::AuditLogger;

#[derive(Clone)]
pub struct FinanceService {
    stores: Stores,
    audit: AuditLogger,
}

impl FinanceService {
    pub fn new(stores: Stores, audit: AuditLogger) -> Self {
        Self { stores, audit }
    }
}

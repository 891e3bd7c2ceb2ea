//! /api/finance: billing, receivables, payables, journal, assets and reports
//!
//! Reads need `finance_read`, drafting and payments `finance_write`;
//! approving, issuing, posting and reversing need `finance_post`.

use hyper::Method;

use super::common::{created, method_not_allowed, not_found, ok, session, ApiRequest, ApiResponse, StatusQuery};
use crate::auth::{AuthContext, Capability};
use crate::db::schemas::{BillingStatus, JournalStatus, PayableStatus, ReceivableStatus, Solution};
use crate::finance::{
    CreateAssetRequest, CreateBillingRequest, CreatePayableRequest, JournalEntryRequest,
    PaymentRequest, UpdateBillingRequest,
};
use crate::server::AppState;
use crate::types::Result;

async fn caller(state: &AppState, req: &ApiRequest, capability: Capability) -> Result<AuthContext> {
    session(state, req, Some(Solution::Finance), capability).await
}

pub async fn handle(state: &AppState, req: &ApiRequest, path: &[&str]) -> Result<ApiResponse> {
    use Capability::{FinancePost as Post, FinanceRead as Read, FinanceWrite as Write};
    let finance = &state.finance;

    match (path, &req.method) {
        // Billings
        (["billings"], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            let query: StatusQuery<BillingStatus> = req.query()?;
            ok(&finance.list_billings(&ctx, query.status).await?)
        }
        (["billings"], &Method::POST) => {
            let ctx = caller(state, req, Write).await?;
            created(&finance.create_billing(&ctx, req.json::<CreateBillingRequest>()?).await?)
        }
        (["billings", id], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            ok(&finance.get_billing(&ctx, id).await?)
        }
        (["billings", id], &Method::PATCH) => {
            let ctx = caller(state, req, Write).await?;
            ok(&finance.update_billing(&ctx, id, req.json::<UpdateBillingRequest>()?).await?)
        }
        (["billings", id, "approve"], &Method::POST) => {
            let ctx = caller(state, req, Post).await?;
            ok(&finance.approve_billing(&ctx, id).await?)
        }
        (["billings", id, "issue"], &Method::POST) => {
            let ctx = caller(state, req, Post).await?;
            ok(&finance.issue_billing(&ctx, id).await?)
        }
        (["billings", id, "cancel"], &Method::POST) => {
            let ctx = caller(state, req, Write).await?;
            ok(&finance.cancel_billing(&ctx, id).await?)
        }

        // Receivables
        (["receivables"], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            let query: StatusQuery<ReceivableStatus> = req.query()?;
            ok(&finance.list_receivables(&ctx, query.status).await?)
        }
        (["receivables", id], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            ok(&finance.get_receivable(&ctx, id).await?)
        }
        (["receivables", id, "payments"], &Method::POST) => {
            let ctx = caller(state, req, Write).await?;
            ok(&finance.record_receivable_payment(&ctx, id, req.json::<PaymentRequest>()?).await?)
        }

        // Payables
        (["payables"], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            let query: StatusQuery<PayableStatus> = req.query()?;
            ok(&finance.list_payables(&ctx, query.status).await?)
        }
        (["payables"], &Method::POST) => {
            let ctx = caller(state, req, Write).await?;
            created(&finance.create_payable(&ctx, req.json::<CreatePayableRequest>()?).await?)
        }
        (["payables", id], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            ok(&finance.get_payable(&ctx, id).await?)
        }
        (["payables", id, "approve"], &Method::POST) => {
            let ctx = caller(state, req, Post).await?;
            ok(&finance.approve_payable(&ctx, id).await?)
        }
        (["payables", id, "payments"], &Method::POST) => {
            let ctx = caller(state, req, Write).await?;
            ok(&finance.record_payable_payment(&ctx, id, req.json::<PaymentRequest>()?).await?)
        }

        // Journal
        (["journal-entries"], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            let query: StatusQuery<JournalStatus> = req.query()?;
            ok(&finance.list_journal_entries(&ctx, query.status).await?)
        }
        (["journal-entries"], &Method::POST) => {
            let ctx = caller(state, req, Write).await?;
            created(&finance.create_journal_entry(&ctx, req.json::<JournalEntryRequest>()?).await?)
        }
        (["journal-entries", id], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            ok(&finance.get_journal_entry(&ctx, id).await?)
        }
        (["journal-entries", id], &Method::PUT | &Method::PATCH) => {
            let ctx = caller(state, req, Write).await?;
            ok(&finance.update_journal_entry(&ctx, id, req.json::<JournalEntryRequest>()?).await?)
        }
        (["journal-entries", id, "post"], &Method::POST) => {
            let ctx = caller(state, req, Post).await?;
            ok(&finance.post_journal_entry(&ctx, id).await?)
        }
        (["journal-entries", id, "reverse"], &Method::POST) => {
            let ctx = caller(state, req, Post).await?;
            created(&finance.reverse_journal_entry(&ctx, id).await?)
        }
        (["trial-balance"], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            ok(&finance.trial_balance(&ctx).await?)
        }

        // Assets and tax
        (["assets"], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            ok(&finance.list_assets(&ctx).await?)
        }
        (["assets"], &Method::POST) => {
            let ctx = caller(state, req, Write).await?;
            created(&finance.create_asset(&ctx, req.json::<CreateAssetRequest>()?).await?)
        }
        (["assets", id], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            ok(&finance.get_asset(&ctx, id).await?)
        }
        (["assets", id, "depreciation"], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            ok(&finance.depreciation_schedule(&ctx, id).await?)
        }
        (["tax-summary"], &Method::GET) => {
            let ctx = caller(state, req, Read).await?;
            ok(&finance.tax_summary(&ctx).await?)
        }

        (["billings" | "receivables" | "payables" | "journal-entries" | "assets"], _)
        | (["billings" | "receivables" | "payables" | "journal-entries" | "assets", _], _)
        | (["trial-balance" | "tax-summary"], _)
        | (["billings", _, "approve" | "issue" | "cancel"], _)
        | (["receivables", _, "payments"], _)
        | (["payables", _, "approve" | "payments"], _)
        | (["journal-entries", _, "post" | "reverse"], _)
        | (["assets", _, "depreciation"], _) => method_not_allowed(),

        _ => not_found(&req.path),
    }
}

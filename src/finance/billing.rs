//! Billings (invoices) and the receivables they create

use bson::doc;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use super::FinanceService;
use crate::auth::AuthContext;
use crate::db::schemas::{
    BillingDoc, BillingLine, BillingStatus, JournalLine, Metadata, Payment, ReceivableDoc,
    ReceivableStatus, SourceRef,
};
use crate::db::{get_scoped, modify_scoped};
use crate::finance::ledger::accounts;
use crate::finance::money::{
    ensure_non_negative, ensure_positive, line_amount, normalize_currency, round2, tax_on,
};
use crate::logging::AuditEvent;
use crate::types::{IbError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct BillingLineInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percent, e.g. 18 for 18%
    #[serde(default)]
    pub tax_rate: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBillingRequest {
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub currency: String,
    pub due_date: NaiveDate,
    pub lines: Vec<BillingLineInput>,
    pub source: Option<SourceRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBillingRequest {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub currency: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub lines: Option<Vec<BillingLineInput>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub paid_on: NaiveDate,
    pub reference: Option<String>,
}

/// Computed lines plus (subtotal, tax_total, total)
fn price_lines(inputs: &[BillingLineInput]) -> Result<(Vec<BillingLine>, Decimal, Decimal, Decimal)> {
    if inputs.is_empty() {
        return Err(IbError::Validation("A billing needs at least one line".into()));
    }

    let mut lines = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        let n = index + 1;
        if input.description.trim().is_empty() {
            return Err(IbError::Validation(format!("Line {n}: description is required")));
        }
        ensure_positive(&format!("Line {n}: quantity"), input.quantity)?;
        ensure_non_negative(&format!("Line {n}: unit_price"), input.unit_price)?;
        ensure_non_negative(&format!("Line {n}: tax_rate"), input.tax_rate)?;

        let amount = line_amount(input.quantity, input.unit_price);
        lines.push(BillingLine {
            description: input.description.trim().to_string(),
            quantity: input.quantity,
            unit_price: input.unit_price,
            tax_rate: input.tax_rate,
            amount,
            tax: tax_on(amount, input.tax_rate),
        });
    }

    let subtotal: Decimal = lines.iter().map(|l| l.amount).sum();
    let tax_total: Decimal = lines.iter().map(|l| l.tax).sum();
    Ok((lines, subtotal, tax_total, subtotal + tax_total))
}

/// `INV-YYYYMMDD-XXXXXX`
fn billing_number(id: &str) -> String {
    let suffix: String = id
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(6)
        .collect::<String>()
        .to_uppercase();
    format!("INV-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

/// Payment amounts must be positive and fit what is still owed
pub(super) fn check_payment(amount: Decimal, outstanding: Decimal) -> Result<Decimal> {
    let amount = round2(amount);
    ensure_positive("amount", amount)?;
    if amount > outstanding {
        return Err(IbError::Validation(format!(
            "Payment {amount} exceeds outstanding {outstanding}"
        )));
    }
    Ok(amount)
}

impl FinanceService {
    pub async fn create_billing(
        &self,
        ctx: &AuthContext,
        req: CreateBillingRequest,
    ) -> Result<BillingDoc> {
        let customer_name = req.customer_name.trim().to_string();
        if customer_name.is_empty() {
            return Err(IbError::Validation("customer_name is required".into()));
        }
        let currency = normalize_currency(&req.currency)?;
        let (lines, subtotal, tax_total, total) = price_lines(&req.lines)?;

        let id = uuid::Uuid::new_v4().to_string();
        let billing = BillingDoc {
            number: billing_number(&id),
            id,
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            customer_name,
            customer_email: req.customer_email.filter(|e| !e.trim().is_empty()),
            currency,
            due_date: req.due_date,
            lines,
            subtotal,
            tax_total,
            total,
            status: BillingStatus::Draft,
            source: req.source,
            receivable_id: None,
            journal_entry_id: None,
            created_by: ctx.user_id.clone(),
            approved_by: None,
            issued_on: None,
        };

        let billing = self.stores.billings.insert(billing).await?;
        info!(billing_id = %billing.id, number = %billing.number, total = %billing.total, "Billing created");
        self.audit.record(ctx, "billing.created", "billing", &billing.id).await;
        Ok(billing)
    }

    pub async fn update_billing(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: UpdateBillingRequest,
    ) -> Result<BillingDoc> {
        let currency = req.currency.as_deref().map(normalize_currency).transpose()?;
        let priced = req.lines.as_deref().map(price_lines).transpose()?;
        if let Some(name) = &req.customer_name {
            if name.trim().is_empty() {
                return Err(IbError::Validation("customer_name is required".into()));
            }
        }

        let billing = modify_scoped(self.stores.billings.as_ref(), &ctx.org_id, id, |billing| {
            if billing.status != BillingStatus::Draft {
                return Err(IbError::Conflict(format!(
                    "Only draft billings can be edited (billing is {})",
                    billing.status
                )));
            }
            if let Some(name) = &req.customer_name {
                billing.customer_name = name.trim().to_string();
            }
            if let Some(email) = &req.customer_email {
                billing.customer_email = Some(email.clone()).filter(|e| !e.trim().is_empty());
            }
            if let Some(currency) = &currency {
                billing.currency = currency.clone();
            }
            if let Some(due_date) = req.due_date {
                billing.due_date = due_date;
            }
            if let Some((lines, subtotal, tax_total, total)) = &priced {
                billing.lines = lines.clone();
                billing.subtotal = *subtotal;
                billing.tax_total = *tax_total;
                billing.total = *total;
            }
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "billing.updated", "billing", &billing.id).await;
        Ok(billing)
    }

    pub async fn approve_billing(&self, ctx: &AuthContext, id: &str) -> Result<BillingDoc> {
        let billing = modify_scoped(self.stores.billings.as_ref(), &ctx.org_id, id, |billing| {
            if billing.status != BillingStatus::Draft {
                return Err(IbError::Conflict(format!(
                    "Only draft billings can be approved (billing is {})",
                    billing.status
                )));
            }
            billing.status = BillingStatus::Approved;
            billing.approved_by = Some(ctx.user_id.clone());
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "billing.approved", "billing", &billing.id).await;
        Ok(billing)
    }

    /// Issue an approved billing: open a receivable and post
    /// Dr receivable / Cr revenue / Cr tax payable.
    pub async fn issue_billing(&self, ctx: &AuthContext, id: &str) -> Result<BillingDoc> {
        let receivable_id = uuid::Uuid::new_v4().to_string();
        let journal_id = uuid::Uuid::new_v4().to_string();
        let today = Utc::now().date_naive();

        let billing = modify_scoped(self.stores.billings.as_ref(), &ctx.org_id, id, |billing| {
            if billing.status != BillingStatus::Approved {
                return Err(IbError::Conflict(format!(
                    "Only approved billings can be issued (billing is {})",
                    billing.status
                )));
            }
            if billing.total <= Decimal::ZERO {
                return Err(IbError::Validation("A zero-value billing cannot be issued".into()));
            }
            billing.status = BillingStatus::Issued;
            billing.issued_on = Some(today);
            billing.receivable_id = Some(receivable_id.clone());
            billing.journal_entry_id = Some(journal_id.clone());
            Ok(())
        })
        .await?;

        let mut lines = vec![JournalLine::debit(accounts::ACCOUNTS_RECEIVABLE, billing.total)];
        if billing.subtotal > Decimal::ZERO {
            lines.push(JournalLine::credit(accounts::REVENUE, billing.subtotal));
        }
        if billing.tax_total > Decimal::ZERO {
            lines.push(JournalLine::credit(accounts::TAX_PAYABLE, billing.tax_total));
        }
        self.post_system_entry(
            ctx,
            journal_id,
            &format!("Invoice {} issued to {}", billing.number, billing.customer_name),
            lines,
            SourceRef::new("billing", &billing.id),
        )
        .await?;

        let receivable = ReceivableDoc {
            id: receivable_id,
            metadata: Metadata::new(),
            org_id: billing.org_id.clone(),
            billing_id: billing.id.clone(),
            customer_name: billing.customer_name.clone(),
            currency: billing.currency.clone(),
            due_date: billing.due_date,
            amount: billing.total,
            paid_amount: Decimal::ZERO,
            outstanding: billing.total,
            status: ReceivableStatus::Open,
            payments: Vec::new(),
        };
        self.stores.receivables.insert(receivable).await?;

        info!(billing_id = %billing.id, number = %billing.number, "Billing issued");
        self.audit.record(ctx, "billing.issued", "billing", &billing.id).await;
        Ok(billing)
    }

    pub async fn cancel_billing(&self, ctx: &AuthContext, id: &str) -> Result<BillingDoc> {
        let billing = modify_scoped(self.stores.billings.as_ref(), &ctx.org_id, id, |billing| {
            match billing.status {
                BillingStatus::Draft | BillingStatus::Approved => {
                    billing.status = BillingStatus::Cancelled;
                    Ok(())
                }
                other => Err(IbError::Conflict(format!(
                    "A billing that is {other} can no longer be cancelled"
                ))),
            }
        })
        .await?;

        self.audit.record(ctx, "billing.cancelled", "billing", &billing.id).await;
        Ok(billing)
    }

    pub async fn get_billing(&self, ctx: &AuthContext, id: &str) -> Result<BillingDoc> {
        get_scoped(self.stores.billings.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_billings(
        &self,
        ctx: &AuthContext,
        status: Option<BillingStatus>,
    ) -> Result<Vec<BillingDoc>> {
        let mut filter = doc! { "org_id": &ctx.org_id };
        if let Some(status) = status {
            filter.insert("status", status);
        }
        self.stores.billings.find_many(filter).await
    }

    // =========================================================================
    // Receivables
    // =========================================================================

    pub async fn get_receivable(&self, ctx: &AuthContext, id: &str) -> Result<ReceivableDoc> {
        get_scoped(self.stores.receivables.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_receivables(
        &self,
        ctx: &AuthContext,
        status: Option<ReceivableStatus>,
    ) -> Result<Vec<ReceivableDoc>> {
        let mut filter = doc! { "org_id": &ctx.org_id };
        if let Some(status) = status {
            filter.insert("status", status);
        }
        self.stores.receivables.find_many(filter).await
    }

    /// Apply a customer payment: Dr cash / Cr receivable. Settling the
    /// receivable marks its billing paid.
    pub async fn record_receivable_payment(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: PaymentRequest,
    ) -> Result<ReceivableDoc> {
        let journal_id = uuid::Uuid::new_v4().to_string();
        let recorded_at = Utc::now();

        let receivable = modify_scoped(self.stores.receivables.as_ref(), &ctx.org_id, id, |r| {
            if r.status == ReceivableStatus::Paid {
                return Err(IbError::Conflict("Receivable is already paid".into()));
            }
            let amount = check_payment(req.amount, r.outstanding)?;
            r.payments.push(Payment {
                amount,
                paid_on: req.paid_on,
                reference: req.reference.clone(),
                journal_entry_id: journal_id.clone(),
                recorded_by: ctx.user_id.clone(),
                recorded_at,
            });
            r.paid_amount += amount;
            r.outstanding = r.amount - r.paid_amount;
            r.status = if r.outstanding.is_zero() {
                ReceivableStatus::Paid
            } else {
                ReceivableStatus::PartiallyPaid
            };
            Ok(())
        })
        .await?;

        let amount = receivable
            .payments
            .last()
            .map(|p| p.amount)
            .unwrap_or_default();
        self.post_system_entry(
            ctx,
            journal_id,
            &format!("Payment from {}", receivable.customer_name),
            vec![
                JournalLine::debit(accounts::CASH, amount),
                JournalLine::credit(accounts::ACCOUNTS_RECEIVABLE, amount),
            ],
            SourceRef::new("receivable", &receivable.id),
        )
        .await?;

        if receivable.status == ReceivableStatus::Paid {
            modify_scoped(
                self.stores.billings.as_ref(),
                &ctx.org_id,
                &receivable.billing_id,
                |billing| {
                    billing.status = BillingStatus::Paid;
                    Ok(())
                },
            )
            .await?;
        }

        self.audit
            .log(
                AuditEvent::new("receivable.payment_recorded", "receivable", &receivable.id)
                    .by(ctx)
                    .with_detail(serde_json::json!({
                        "amount": amount,
                        "outstanding": receivable.outstanding,
                    })),
            )
            .await;
        Ok(receivable)
    }
}

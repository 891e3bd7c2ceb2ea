//! Vendor payables

use bson::doc;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::billing::{check_payment, PaymentRequest};
use super::FinanceService;
use crate::auth::AuthContext;
use crate::db::schemas::{JournalLine, Metadata, PayableDoc, PayableStatus, Payment, SourceRef};
use crate::db::{get_scoped, modify_scoped};
use crate::finance::ledger::accounts;
use crate::finance::money::{ensure_positive, normalize_currency, round2};
use crate::logging::AuditEvent;
use crate::types::{IbError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayableRequest {
    pub vendor_name: String,
    pub currency: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub source: Option<SourceRef>,
}

impl FinanceService {
    pub async fn create_payable(
        &self,
        ctx: &AuthContext,
        req: CreatePayableRequest,
    ) -> Result<PayableDoc> {
        let vendor_name = req.vendor_name.trim().to_string();
        if vendor_name.is_empty() {
            return Err(IbError::Validation("vendor_name is required".into()));
        }
        let currency = normalize_currency(&req.currency)?;
        let amount = round2(req.amount);
        ensure_positive("amount", amount)?;

        let payable = PayableDoc {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            vendor_name,
            currency,
            due_date: req.due_date,
            amount,
            paid_amount: Decimal::ZERO,
            outstanding: amount,
            status: PayableStatus::Pending,
            source: req.source,
            payments: Vec::new(),
            approved_by: None,
            journal_entry_id: None,
            created_by: ctx.user_id.clone(),
        };

        let payable = self.stores.payables.insert(payable).await?;
        self.audit.record(ctx, "payable.created", "payable", &payable.id).await;
        Ok(payable)
    }

    /// Approve for payment and recognise the expense: Dr expense / Cr payables
    pub async fn approve_payable(&self, ctx: &AuthContext, id: &str) -> Result<PayableDoc> {
        let journal_id = uuid::Uuid::new_v4().to_string();

        let payable = modify_scoped(self.stores.payables.as_ref(), &ctx.org_id, id, |payable| {
            if payable.status != PayableStatus::Pending {
                return Err(IbError::Conflict(format!("Payable is already {}", payable.status)));
            }
            payable.status = PayableStatus::Approved;
            payable.approved_by = Some(ctx.user_id.clone());
            payable.journal_entry_id = Some(journal_id.clone());
            Ok(())
        })
        .await?;

        self.post_system_entry(
            ctx,
            journal_id,
            &format!("Payable to {} approved", payable.vendor_name),
            vec![
                JournalLine::debit(accounts::EXPENSE, payable.amount),
                JournalLine::credit(accounts::ACCOUNTS_PAYABLE, payable.amount),
            ],
            SourceRef::new("payable", &payable.id),
        )
        .await?;

        self.audit.record(ctx, "payable.approved", "payable", &payable.id).await;
        Ok(payable)
    }

    /// Pay a vendor: Dr payables / Cr cash
    pub async fn record_payable_payment(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: PaymentRequest,
    ) -> Result<PayableDoc> {
        let journal_id = uuid::Uuid::new_v4().to_string();
        let recorded_at = Utc::now();

        let payable = modify_scoped(self.stores.payables.as_ref(), &ctx.org_id, id, |p| {
            match p.status {
                PayableStatus::Approved | PayableStatus::PartiallyPaid => {}
                PayableStatus::Pending => {
                    return Err(IbError::Conflict("Payable must be approved before payment".into()))
                }
                PayableStatus::Paid => return Err(IbError::Conflict("Payable is already paid".into())),
            }
            let amount = check_payment(req.amount, p.outstanding)?;
            p.payments.push(Payment {
                amount,
                paid_on: req.paid_on,
                reference: req.reference.clone(),
                journal_entry_id: journal_id.clone(),
                recorded_by: ctx.user_id.clone(),
                recorded_at,
            });
            p.paid_amount += amount;
            p.outstanding = p.amount - p.paid_amount;
            p.status = if p.outstanding.is_zero() {
                PayableStatus::Paid
            } else {
                PayableStatus::PartiallyPaid
            };
            Ok(())
        })
        .await?;

        let amount = payable.payments.last().map(|p| p.amount).unwrap_or_default();
        self.post_system_entry(
            ctx,
            journal_id,
            &format!("Payment to {}", payable.vendor_name),
            vec![
                JournalLine::debit(accounts::ACCOUNTS_PAYABLE, amount),
                JournalLine::credit(accounts::CASH, amount),
            ],
            SourceRef::new("payable", &payable.id),
        )
        .await?;

        self.audit
            .log(
                AuditEvent::new("payable.payment_recorded", "payable", &payable.id)
                    .by(ctx)
                    .with_detail(serde_json::json!({
                        "amount": amount,
                        "outstanding": payable.outstanding,
                    })),
            )
            .await;
        Ok(payable)
    }

    pub async fn get_payable(&self, ctx: &AuthContext, id: &str) -> Result<PayableDoc> {
        get_scoped(self.stores.payables.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_payables(
        &self,
        ctx: &AuthContext,
        status: Option<PayableStatus>,
    ) -> Result<Vec<PayableDoc>> {
        let mut filter = doc! { "org_id": &ctx.org_id };
        if let Some(status) = status {
            filter.insert("status", status);
        }
        self.stores.payables.find_many(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::schemas::UserDoc;
    use crate::db::Stores;
    use crate::logging::AuditLogger;
    use rust_decimal_macros::dec;

    fn setup() -> (FinanceService, AuthContext) {
        let user = UserDoc::new("org-1", "ap@x.io", "AP", String::new(), Role::FinanceHead);
        (
            FinanceService::new(Stores::memory(), AuditLogger::new()),
            AuthContext::from_user(&user),
        )
    }

    fn pay(amount: Decimal) -> PaymentRequest {
        PaymentRequest {
            amount,
            paid_on: NaiveDate::from_ymd_opt(2030, 2, 1).unwrap(),
            reference: Some("wire-1".into()),
        }
    }

    #[tokio::test]
    async fn test_payable_lifecycle() {
        let (service, ctx) = setup();
        let payable = service
            .create_payable(
                &ctx,
                CreatePayableRequest {
                    vendor_name: "Steel Co".into(),
                    currency: "EUR".into(),
                    due_date: NaiveDate::from_ymd_opt(2030, 3, 1).unwrap(),
                    amount: dec!(500),
                    source: None,
                },
            )
            .await
            .unwrap();

        // pending payables cannot be paid
        assert!(matches!(
            service.record_payable_payment(&ctx, &payable.id, pay(dec!(100))).await,
            Err(IbError::Conflict(_))
        ));

        let approved = service.approve_payable(&ctx, &payable.id).await.unwrap();
        assert_eq!(approved.status, PayableStatus::Approved);
        assert!(service.approve_payable(&ctx, &payable.id).await.is_err());

        let partial = service
            .record_payable_payment(&ctx, &payable.id, pay(dec!(200)))
            .await
            .unwrap();
        assert_eq!(partial.status, PayableStatus::PartiallyPaid);
        assert_eq!(partial.outstanding, dec!(300));

        assert!(service
            .record_payable_payment(&ctx, &payable.id, pay(dec!(300.01)))
            .await
            .is_err());
        let paid = service
            .record_payable_payment(&ctx, &payable.id, pay(dec!(300)))
            .await
            .unwrap();
        assert_eq!(paid.status, PayableStatus::Paid);
        assert_eq!(paid.payments.len(), 2);

        let tb = service.trial_balance(&ctx).await.unwrap();
        assert!(tb.balanced);
        let balance = |code: &str| {
            tb.accounts
                .iter()
                .find(|a| a.account_code == code)
                .map(|a| a.balance)
                .unwrap()
        };
        assert_eq!(balance(accounts::EXPENSE), dec!(500));
        assert_eq!(balance(accounts::CASH), dec!(-500));
        assert!(balance(accounts::ACCOUNTS_PAYABLE).is_zero());
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amount() {
        let (service, ctx) = setup();
        let result = service
            .create_payable(
                &ctx,
                CreatePayableRequest {
                    vendor_name: "Steel Co".into(),
                    currency: "EUR".into(),
                    due_date: NaiveDate::from_ymd_opt(2030, 3, 1).unwrap(),
                    amount: dec!(0),
                    source: None,
                },
            )
            .await;
        assert!(matches!(result, Err(IbError::Validation(_))));
    }
}

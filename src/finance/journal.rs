//! Journal entries and the trial balance

use bson::doc;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;

use super::FinanceService;
use crate::auth::AuthContext;
use crate::db::schemas::{JournalEntryDoc, JournalLine, JournalStatus, Metadata, SourceRef};
use crate::db::{get_scoped, modify_scoped};
use crate::finance::ledger::{mirror, trial_balance, validate_lines, TrialBalance};
use crate::logging::AuditEvent;
use crate::types::{IbError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct JournalEntryRequest {
    pub date: NaiveDate,
    pub description: String,
    pub lines: Vec<JournalLine>,
}

impl FinanceService {
    /// Build a validated entry; nothing is stored
    pub(super) fn build_entry(
        ctx: &AuthContext,
        id: String,
        date: NaiveDate,
        description: &str,
        lines: &[JournalLine],
        status: JournalStatus,
        source: Option<SourceRef>,
    ) -> Result<JournalEntryDoc> {
        let description = description.trim();
        if description.is_empty() {
            return Err(IbError::Validation("description is required".into()));
        }
        let lines = validate_lines(lines)?;

        Ok(JournalEntryDoc {
            id,
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            date,
            description: description.to_string(),
            lines,
            status,
            source,
            reversal_of: None,
            reversed_by: None,
            created_by: ctx.user_id.clone(),
            posted_at: (status == JournalStatus::Posted).then(Utc::now),
        })
    }

    /// Store a posted entry generated by another finance operation
    pub(super) async fn post_system_entry(
        &self,
        ctx: &AuthContext,
        id: String,
        description: &str,
        lines: Vec<JournalLine>,
        source: SourceRef,
    ) -> Result<JournalEntryDoc> {
        let entry = Self::build_entry(
            ctx,
            id,
            Utc::now().date_naive(),
            description,
            &lines,
            JournalStatus::Posted,
            Some(source),
        )?;
        let entry = self.stores.journal_entries.insert(entry).await?;
        info!(entry_id = %entry.id, "System journal entry posted");
        self.audit.record(ctx, "journal.posted", "journal entry", &entry.id).await;
        Ok(entry)
    }

    pub async fn create_journal_entry(
        &self,
        ctx: &AuthContext,
        req: JournalEntryRequest,
    ) -> Result<JournalEntryDoc> {
        let entry = Self::build_entry(
            ctx,
            uuid::Uuid::new_v4().to_string(),
            req.date,
            &req.description,
            &req.lines,
            JournalStatus::Draft,
            None,
        )?;
        let entry = self.stores.journal_entries.insert(entry).await?;
        self.audit.record(ctx, "journal.created", "journal entry", &entry.id).await;
        Ok(entry)
    }

    /// Replace a draft's contents; the same balance rules apply as on create
    pub async fn update_journal_entry(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: JournalEntryRequest,
    ) -> Result<JournalEntryDoc> {
        let lines = validate_lines(&req.lines)?;
        let description = req.description.trim().to_string();
        if description.is_empty() {
            return Err(IbError::Validation("description is required".into()));
        }

        let entry = modify_scoped(self.stores.journal_entries.as_ref(), &ctx.org_id, id, |entry| {
            if entry.status != JournalStatus::Draft {
                return Err(IbError::Conflict(format!(
                    "Only draft entries can be edited (entry is {})",
                    entry.status
                )));
            }
            entry.date = req.date;
            entry.description = description.clone();
            entry.lines = lines.clone();
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "journal.updated", "journal entry", &entry.id).await;
        Ok(entry)
    }

    pub async fn post_journal_entry(&self, ctx: &AuthContext, id: &str) -> Result<JournalEntryDoc> {
        let entry = modify_scoped(self.stores.journal_entries.as_ref(), &ctx.org_id, id, |entry| {
            if entry.status != JournalStatus::Draft {
                return Err(IbError::Conflict(format!("Entry is already {}", entry.status)));
            }
            // Stored drafts are re-checked in case they predate validation
            validate_lines(&entry.lines)?;
            entry.status = JournalStatus::Posted;
            entry.posted_at = Some(Utc::now());
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "journal.posted", "journal entry", &entry.id).await;
        Ok(entry)
    }

    /// Mark a posted entry reversed and post its mirror image
    pub async fn reverse_journal_entry(
        &self,
        ctx: &AuthContext,
        id: &str,
    ) -> Result<JournalEntryDoc> {
        let mirror_id = uuid::Uuid::new_v4().to_string();

        let original = modify_scoped(self.stores.journal_entries.as_ref(), &ctx.org_id, id, |entry| {
            if entry.status != JournalStatus::Posted {
                return Err(IbError::Conflict(format!(
                    "Only posted entries can be reversed (entry is {})",
                    entry.status
                )));
            }
            entry.status = JournalStatus::Reversed;
            entry.reversed_by = Some(mirror_id.clone());
            Ok(())
        })
        .await?;

        let mut reversal = Self::build_entry(
            ctx,
            mirror_id,
            Utc::now().date_naive(),
            &format!("Reversal of: {}", original.description),
            &mirror(&original.lines),
            JournalStatus::Posted,
            original.source.clone(),
        )?;
        reversal.reversal_of = Some(original.id.clone());
        let reversal = self.stores.journal_entries.insert(reversal).await?;

        self.audit
            .log(
                AuditEvent::new("journal.reversed", "journal entry", &original.id)
                    .by(ctx)
                    .with_detail(serde_json::json!({ "reversal_id": reversal.id })),
            )
            .await;
        Ok(reversal)
    }

    pub async fn get_journal_entry(&self, ctx: &AuthContext, id: &str) -> Result<JournalEntryDoc> {
        get_scoped(self.stores.journal_entries.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_journal_entries(
        &self,
        ctx: &AuthContext,
        status: Option<JournalStatus>,
    ) -> Result<Vec<JournalEntryDoc>> {
        let mut filter = doc! { "org_id": &ctx.org_id };
        if let Some(status) = status {
            filter.insert("status", status);
        }
        self.stores.journal_entries.find_many(filter).await
    }

    pub async fn trial_balance(&self, ctx: &AuthContext) -> Result<TrialBalance> {
        let entries = self
            .stores
            .journal_entries
            .find_many(doc! {
                "org_id": &ctx.org_id,
                "status": { "$in": [JournalStatus::Posted, JournalStatus::Reversed] },
            })
            .await?;
        Ok(trial_balance(&entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::schemas::UserDoc;
    use crate::db::Stores;
    use crate::logging::AuditLogger;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn line(account: &str, debit: Decimal, credit: Decimal) -> JournalLine {
        JournalLine {
            account_code: account.into(),
            description: None,
            debit,
            credit,
        }
    }

    fn setup() -> (FinanceService, AuthContext) {
        let user = UserDoc::new("org-1", "acct@x.io", "Acct", String::new(), Role::FinanceHead);
        (
            FinanceService::new(Stores::memory(), AuditLogger::new()),
            AuthContext::from_user(&user),
        )
    }

    fn request(debit: Decimal, credit: Decimal) -> JournalEntryRequest {
        JournalEntryRequest {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            description: "Office rent".into(),
            lines: vec![line("5000", debit, dec!(0)), line("1000", dec!(0), credit)],
        }
    }

    #[tokio::test]
    async fn test_unbalanced_entry_never_persists() {
        let (service, ctx) = setup();
        assert!(service.create_journal_entry(&ctx, request(dec!(10), dec!(9))).await.is_err());
        assert!(service.list_journal_entries(&ctx, None).await.unwrap().is_empty());

        let entry = service.create_journal_entry(&ctx, request(dec!(10), dec!(10))).await.unwrap();
        assert!(service
            .update_journal_entry(&ctx, &entry.id, request(dec!(10), dec!(12)))
            .await
            .is_err());
        let stored = service.get_journal_entry(&ctx, &entry.id).await.unwrap();
        assert_eq!(stored.lines[1].credit, dec!(10));
    }

    #[tokio::test]
    async fn test_post_and_reverse_nets_to_zero() {
        let (service, ctx) = setup();
        let entry = service.create_journal_entry(&ctx, request(dec!(250), dec!(250))).await.unwrap();

        // drafts do not count
        assert!(service.trial_balance(&ctx).await.unwrap().accounts.is_empty());

        let posted = service.post_journal_entry(&ctx, &entry.id).await.unwrap();
        assert_eq!(posted.status, JournalStatus::Posted);
        assert!(service
            .update_journal_entry(&ctx, &entry.id, request(dec!(1), dec!(1)))
            .await
            .is_err());

        let tb = service.trial_balance(&ctx).await.unwrap();
        assert!(tb.balanced);
        assert_eq!(tb.total_debit, dec!(250));

        let reversal = service.reverse_journal_entry(&ctx, &entry.id).await.unwrap();
        assert_eq!(reversal.reversal_of.as_deref(), Some(entry.id.as_str()));
        assert!(service.reverse_journal_entry(&ctx, &entry.id).await.is_err());

        let tb = service.trial_balance(&ctx).await.unwrap();
        assert!(tb.balanced);
        assert!(tb.accounts.iter().all(|a| a.balance.is_zero()));
    }
}

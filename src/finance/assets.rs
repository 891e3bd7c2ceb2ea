//! Fixed assets and the tax summary

use bson::doc;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::FinanceService;
use crate::auth::AuthContext;
use crate::db::get_scoped;
use crate::db::schemas::{AssetDoc, AssetStatus, BillingStatus, Metadata};
use crate::finance::depreciation::{schedule, DepreciationRow, MAX_USEFUL_LIFE_MONTHS};
use crate::finance::money::{ensure_non_negative, ensure_positive, round2};
use crate::types::{IbError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAssetRequest {
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub cost: Decimal,
    #[serde(default)]
    pub salvage_value: Decimal,
    pub useful_life_months: u32,
    pub acquired_on: NaiveDate,
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaxBucket {
    pub tax_rate: Decimal,
    pub taxable_amount: Decimal,
    pub tax: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaxSummary {
    pub buckets: Vec<TaxBucket>,
    pub taxable_total: Decimal,
    pub tax_total: Decimal,
}

impl FinanceService {
    pub async fn create_asset(&self, ctx: &AuthContext, req: CreateAssetRequest) -> Result<AssetDoc> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(IbError::Validation("name is required".into()));
        }
        let cost = round2(req.cost);
        let salvage_value = round2(req.salvage_value);
        ensure_positive("cost", cost)?;
        ensure_non_negative("salvage_value", salvage_value)?;
        if salvage_value > cost {
            return Err(IbError::Validation("salvage_value cannot exceed cost".into()));
        }
        if !(1..=MAX_USEFUL_LIFE_MONTHS).contains(&req.useful_life_months) {
            return Err(IbError::Validation(format!(
                "useful_life_months must be between 1 and {MAX_USEFUL_LIFE_MONTHS}"
            )));
        }

        let asset = AssetDoc {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            name,
            category: req.category.trim().to_lowercase(),
            cost,
            salvage_value,
            useful_life_months: req.useful_life_months,
            acquired_on: req.acquired_on,
            status: AssetStatus::Active,
            created_by: ctx.user_id.clone(),
        };

        let asset = self.stores.assets.insert(asset).await?;
        self.audit.record(ctx, "asset.created", "asset", &asset.id).await;
        Ok(asset)
    }

    pub async fn get_asset(&self, ctx: &AuthContext, id: &str) -> Result<AssetDoc> {
        get_scoped(self.stores.assets.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_assets(&self, ctx: &AuthContext) -> Result<Vec<AssetDoc>> {
        self.stores.assets.find_many(doc! { "org_id": &ctx.org_id }).await
    }

    pub async fn depreciation_schedule(
        &self,
        ctx: &AuthContext,
        id: &str,
    ) -> Result<Vec<DepreciationRow>> {
        let asset = self.get_asset(ctx, id).await?;
        Ok(schedule(&asset))
    }

    /// Issued and paid billings grouped by line tax rate
    pub async fn tax_summary(&self, ctx: &AuthContext) -> Result<TaxSummary> {
        let billings = self
            .stores
            .billings
            .find_many(doc! {
                "org_id": &ctx.org_id,
                "status": { "$in": [BillingStatus::Issued, BillingStatus::Paid] },
            })
            .await?;

        // keyed by normalized rate so 18 and 18.00 share a bucket
        let mut by_rate: BTreeMap<Decimal, (Decimal, Decimal)> = BTreeMap::new();
        for line in billings.iter().flat_map(|b| b.lines.iter()) {
            let slot = by_rate
                .entry(line.tax_rate.normalize())
                .or_insert((Decimal::ZERO, Decimal::ZERO));
            slot.0 += line.amount;
            slot.1 += line.tax;
        }

        let buckets: Vec<TaxBucket> = by_rate
            .into_iter()
            .map(|(tax_rate, (taxable_amount, tax))| TaxBucket {
                tax_rate,
                taxable_amount,
                tax,
            })
            .collect();
        let taxable_total: Decimal = buckets.iter().map(|b| b.taxable_amount).sum();
        let tax_total: Decimal = buckets.iter().map(|b| b.tax).sum();

        Ok(TaxSummary {
            buckets,
            taxable_total,
            tax_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::schemas::UserDoc;
    use crate::db::Stores;
    use crate::finance::{BillingLineInput, CreateBillingRequest};
    use crate::logging::AuditLogger;
    use rust_decimal_macros::dec;

    fn setup() -> (FinanceService, AuthContext) {
        let user = UserDoc::new("org-1", "fa@x.io", "FA", String::new(), Role::Accountant);
        (
            FinanceService::new(Stores::memory(), AuditLogger::new()),
            AuthContext::from_user(&user),
        )
    }

    fn asset_request(cost: Decimal, salvage: Decimal, months: u32) -> CreateAssetRequest {
        CreateAssetRequest {
            name: "Forklift".into(),
            category: "Vehicles".into(),
            cost,
            salvage_value: salvage,
            useful_life_months: months,
            acquired_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_asset_schedule() {
        let (service, ctx) = setup();
        assert!(service.create_asset(&ctx, asset_request(dec!(100), dec!(200), 12)).await.is_err());
        assert!(service.create_asset(&ctx, asset_request(dec!(100), dec!(0), 0)).await.is_err());

        let asset = service
            .create_asset(&ctx, asset_request(dec!(10000), dec!(1000), 36))
            .await
            .unwrap();
        assert_eq!(asset.category, "vehicles");

        let rows = service.depreciation_schedule(&ctx, &asset.id).await.unwrap();
        assert_eq!(rows.len(), 36);
        assert_eq!(rows[0].depreciation, dec!(250));
        assert_eq!(rows.last().unwrap().book_value, dec!(1000));
    }

    #[tokio::test]
    async fn test_useful_life_is_capped() {
        let (service, ctx) = setup();
        let err = service
            .create_asset(&ctx, asset_request(dec!(5000), dec!(0), u32::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, IbError::Validation(_)));
        assert!(service
            .create_asset(&ctx, asset_request(dec!(5000), dec!(0), MAX_USEFUL_LIFE_MONTHS + 1))
            .await
            .is_err());

        let longest = service
            .create_asset(&ctx, asset_request(dec!(12000), dec!(0), MAX_USEFUL_LIFE_MONTHS))
            .await
            .unwrap();
        let rows = service.depreciation_schedule(&ctx, &longest.id).await.unwrap();
        assert_eq!(rows.len(), MAX_USEFUL_LIFE_MONTHS as usize);
        assert_eq!(rows.last().unwrap().book_value, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_tax_summary_only_counts_issued() {
        let (service, ctx) = setup();
        let req = CreateBillingRequest {
            customer_name: "Acme".into(),
            customer_email: None,
            currency: "INR".into(),
            due_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            lines: vec![
                BillingLineInput {
                    description: "Goods".into(),
                    quantity: dec!(2),
                    unit_price: dec!(100),
                    tax_rate: dec!(18),
                },
                BillingLineInput {
                    description: "Service".into(),
                    quantity: dec!(1),
                    unit_price: dec!(50),
                    tax_rate: dec!(18.00),
                },
            ],
            source: None,
        };

        let issued = service.create_billing(&ctx, req.clone()).await.unwrap();
        service.approve_billing(&ctx, &issued.id).await.unwrap();
        service.issue_billing(&ctx, &issued.id).await.unwrap();
        // stays draft
        service.create_billing(&ctx, req).await.unwrap();

        let summary = service.tax_summary(&ctx).await.unwrap();
        assert_eq!(summary.buckets.len(), 1);
        assert_eq!(summary.buckets[0].taxable_amount, dec!(250));
        assert_eq!(summary.buckets[0].tax, dec!(45));
        assert_eq!(summary.tax_total, dec!(45));
    }
}

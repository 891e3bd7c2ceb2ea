//! Straight-line depreciation

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::schemas::AssetDoc;
use crate::finance::money::round2;

/// Longest useful life an asset may declare (100 years)
pub const MAX_USEFUL_LIFE_MONTHS: u32 = 1200;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DepreciationRow {
    /// 1-based month number
    pub period: u32,
    pub date: NaiveDate,
    pub depreciation: Decimal,
    pub accumulated: Decimal,
    pub book_value: Decimal,
}

/// Monthly schedule whose accumulated depreciation ends exactly at
/// `cost - salvage_value`; the final month absorbs rounding.
///
/// Lives beyond `MAX_USEFUL_LIFE_MONTHS` are clamped so a bad stored record
/// cannot size an unbounded schedule.
pub fn schedule(asset: &AssetDoc) -> Vec<DepreciationRow> {
    let months = asset.useful_life_months.min(MAX_USEFUL_LIFE_MONTHS);
    if months == 0 {
        return Vec::new();
    }

    let depreciable = (asset.cost - asset.salvage_value).max(Decimal::ZERO);
    let monthly = round2(depreciable / Decimal::from(months));

    let mut accumulated = Decimal::ZERO;
    let mut rows = Vec::with_capacity(months as usize);
    for period in 1..=months {
        let remaining = depreciable - accumulated;
        let depreciation = if period == months {
            remaining
        } else {
            monthly.min(remaining)
        };
        accumulated += depreciation;

        let date = asset
            .acquired_on
            .checked_add_months(Months::new(period))
            .unwrap_or(asset.acquired_on);

        rows.push(DepreciationRow {
            period,
            date,
            depreciation,
            accumulated,
            book_value: asset.cost - accumulated,
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{AssetStatus, Metadata};
    use rust_decimal_macros::dec;

    fn asset(cost: Decimal, salvage: Decimal, months: u32) -> AssetDoc {
        AssetDoc {
            id: "a1".into(),
            metadata: Metadata::new(),
            org_id: "o".into(),
            name: "Laptop".into(),
            category: "it".into(),
            cost,
            salvage_value: salvage,
            useful_life_months: months,
            acquired_on: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            status: AssetStatus::Active,
            created_by: "u".into(),
        }
    }

    #[test]
    fn test_last_month_absorbs_rounding() {
        let rows = schedule(&asset(dec!(1000), dec!(0), 3));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].depreciation, dec!(333.33));
        assert_eq!(rows[1].depreciation, dec!(333.33));
        assert_eq!(rows[2].depreciation, dec!(333.34));
        assert_eq!(rows[2].accumulated, dec!(1000));
        assert_eq!(rows[2].book_value, dec!(0));
    }

    #[test]
    fn test_salvage_value_is_kept() {
        let rows = schedule(&asset(dec!(1200), dec!(200), 12));
        let last = rows.last().unwrap();
        assert_eq!(last.accumulated, dec!(1000));
        assert_eq!(last.book_value, dec!(200));
        // month-end dates clamp
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_upward_rounding_never_overshoots() {
        let rows = schedule(&asset(dec!(0.06), dec!(0), 12));
        assert!(rows.iter().all(|r| r.depreciation >= Decimal::ZERO));
        assert_eq!(rows.last().unwrap().accumulated, dec!(0.06));
    }

    #[test]
    fn test_oversized_life_is_clamped() {
        let rows = schedule(&asset(dec!(1200), dec!(0), u32::MAX));
        assert_eq!(rows.len(), MAX_USEFUL_LIFE_MONTHS as usize);
        assert_eq!(rows.last().unwrap().accumulated, dec!(1200));
    }
}

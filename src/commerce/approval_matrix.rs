//! Approval matrix for commits
//!
//! Maps a deal's value, margin and risk to the roles that must sign off
//! before it can move to contract.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::auth::Role;
use crate::config::ApprovalArgs;
use crate::db::schemas::{DealFigures, DealKind};

/// Thresholds the matrix compares against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApprovalPolicy {
    /// Value strictly above this needs the finance head
    pub finance_value: Decimal,
    /// Value strictly above this needs the CEO
    pub ceo_value: Decimal,
    /// Revenue margin strictly below this needs the finance head
    pub min_margin: Decimal,
    /// Revenue margin strictly below this needs the CEO
    pub critical_margin: Decimal,
    /// Risk at or above this needs legal
    pub legal_risk: Decimal,
    /// Risk at or above this needs the CEO
    pub ceo_risk: Decimal,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            finance_value: dec!(100000),
            ceo_value: dec!(500000),
            min_margin: dec!(20),
            critical_margin: dec!(10),
            legal_risk: dec!(60),
            ceo_risk: dec!(80),
        }
    }
}

impl From<&ApprovalArgs> for ApprovalPolicy {
    fn from(args: &ApprovalArgs) -> Self {
        Self {
            finance_value: args.approval_finance_value,
            ceo_value: args.approval_ceo_value,
            min_margin: args.approval_min_margin,
            critical_margin: args.approval_critical_margin,
            legal_risk: args.approval_legal_risk,
            ceo_risk: args.approval_ceo_risk,
        }
    }
}

impl ApprovalPolicy {
    /// Roles that must approve, de-duplicated, most junior first
    pub fn required_roles(&self, kind: DealKind, figures: &DealFigures) -> Vec<Role> {
        let mut roles = vec![match kind {
            DealKind::Revenue => Role::SalesManager,
            DealKind::Procurement => Role::ProcurementManager,
        }];

        if figures.total_value > self.finance_value {
            roles.push(Role::FinanceHead);
        }
        if figures.total_value > self.ceo_value {
            roles.push(Role::Ceo);
        }

        if kind == DealKind::Revenue {
            if figures.gross_margin_percent < self.min_margin {
                roles.push(Role::FinanceHead);
            }
            if figures.gross_margin_percent < self.critical_margin {
                roles.push(Role::Ceo);
            }
        }

        if figures.risk_score >= self.legal_risk {
            roles.push(Role::Legal);
        }
        if figures.risk_score >= self.ceo_risk {
            roles.push(Role::Ceo);
        }

        roles.sort_by_key(|role| role.approval_rank());
        roles.dedup();
        roles
    }
}

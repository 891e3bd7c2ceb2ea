//! Double-entry rules and the trial balance
//!
//! Every journal write, manual or system-generated, passes through
//! `validate_lines`, so an unbalanced entry never reaches storage.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::schemas::{JournalEntryDoc, JournalLine, JournalStatus};
use crate::finance::money::round2;
use crate::types::{IbError, Result};

/// Chart of accounts used by system postings
pub mod accounts {
    pub const CASH: &str = "1000";
    pub const ACCOUNTS_RECEIVABLE: &str = "1100";
    pub const ACCOUNTS_PAYABLE: &str = "2000";
    pub const TAX_PAYABLE: &str = "2100";
    pub const REVENUE: &str = "4000";
    pub const EXPENSE: &str = "5000";
}

/// Check that lines form a balanced double entry.
///
/// Returns the rounded lines: at least two, each with exactly one positive
/// side, nothing negative, debits equal credits.
pub fn validate_lines(lines: &[JournalLine]) -> Result<Vec<JournalLine>> {
    if lines.len() < 2 {
        return Err(IbError::Validation(
            "A journal entry needs at least two lines".into(),
        ));
    }

    let mut rounded = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        let n = index + 1;
        if line.account_code.trim().is_empty() {
            return Err(IbError::Validation(format!("Line {n}: account_code is required")));
        }
        if line.debit.is_sign_negative() && !line.debit.is_zero()
            || line.credit.is_sign_negative() && !line.credit.is_zero()
        {
            return Err(IbError::Validation(format!("Line {n}: amounts must not be negative")));
        }

        let debit = round2(line.debit);
        let credit = round2(line.credit);
        match (debit > Decimal::ZERO, credit > Decimal::ZERO) {
            (true, false) | (false, true) => {}
            (true, true) => {
                return Err(IbError::Validation(format!(
                    "Line {n}: a line is either a debit or a credit, not both"
                )))
            }
            (false, false) => {
                return Err(IbError::Validation(format!(
                    "Line {n}: debit or credit must be greater than zero"
                )))
            }
        }

        rounded.push(JournalLine {
            account_code: line.account_code.trim().to_string(),
            description: line.description.clone(),
            debit,
            credit,
        });
    }

    let (debits, credits) = totals(&rounded);
    if debits != credits {
        return Err(IbError::Validation(format!(
            "Entry is unbalanced: debits {debits} != credits {credits}"
        )));
    }

    Ok(rounded)
}

/// Sum of debits and credits
pub fn totals(lines: &[JournalLine]) -> (Decimal, Decimal) {
    lines.iter().fold((Decimal::ZERO, Decimal::ZERO), |(d, c), line| {
        (d + line.debit, c + line.credit)
    })
}

/// Lines with debit and credit swapped, for reversals
pub fn mirror(lines: &[JournalLine]) -> Vec<JournalLine> {
    lines
        .iter()
        .map(|line| JournalLine {
            account_code: line.account_code.clone(),
            description: line.description.clone(),
            debit: line.credit,
            credit: line.debit,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AccountBalance {
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    /// debit - credit
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialBalance {
    pub accounts: Vec<AccountBalance>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub balanced: bool,
}

/// Per-account totals over everything that hit the ledger.
///
/// Posted entries count, and so do reversed ones together with their posted
/// mirror, which nets them to zero. Drafts are ignored.
pub fn trial_balance(entries: &[JournalEntryDoc]) -> TrialBalance {
    let mut by_account: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();

    for entry in entries
        .iter()
        .filter(|e| matches!(e.status, JournalStatus::Posted | JournalStatus::Reversed))
    {
        for line in &entry.lines {
            let slot = by_account
                .entry(line.account_code.clone())
                .or_insert((Decimal::ZERO, Decimal::ZERO));
            slot.0 += line.debit;
            slot.1 += line.credit;
        }
    }

    let accounts: Vec<AccountBalance> = by_account
        .into_iter()
        .map(|(account_code, (debit, credit))| AccountBalance {
            account_code,
            debit,
            credit,
            balance: debit - credit,
        })
        .collect();

    let total_debit: Decimal = accounts.iter().map(|a| a.debit).sum();
    let total_credit: Decimal = accounts.iter().map(|a| a.credit).sum();

    TrialBalance {
        accounts,
        total_debit,
        total_credit,
        balanced: total_debit == total_credit,
    }
}

//! Duplicate lead detection
//!
//! Two leads are duplicates when they share a normalized email, a phone number
//! (digits only) or a company name once case, punctuation and legal suffixes
//! are stripped.

use bson::doc;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::db::schemas::{normalize_email, LeadDoc, LeadStatus};
use crate::db::Repository;
use crate::types::Result;

const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "incorporated", "ltd", "limited", "llc", "llp", "gmbh", "pvt", "private", "corp",
    "corporation", "co", "company", "plc", "sa", "ag", "bv", "pte",
];

fn non_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"))
}

/// Lowercase, strip punctuation and trailing legal suffixes
pub fn normalize_company(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned = non_alnum().replace_all(&lowered, " ");
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while words.len() > 1 && words.last().is_some_and(|w| LEGAL_SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}

pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Why a lead was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Email,
    Phone,
    Company,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMatch {
    pub lead_id: String,
    pub company_name: String,
    pub reasons: Vec<MatchReason>,
}

impl DuplicateMatch {
    pub fn is_email_match(&self) -> bool {
        self.reasons.contains(&MatchReason::Email)
    }
}

/// Reasons `candidate` duplicates `lead`, empty when it does not
pub fn match_reasons(lead: &LeadDoc, candidate: &LeadDoc) -> Vec<MatchReason> {
    let mut reasons = Vec::new();

    if let (Some(a), Some(b)) = (&lead.email, &candidate.email) {
        if !a.trim().is_empty() && normalize_email(a) == normalize_email(b) {
            reasons.push(MatchReason::Email);
        }
    }

    if let (Some(a), Some(b)) = (&lead.phone, &candidate.phone) {
        let a = normalize_phone(a);
        if a.len() >= 7 && a == normalize_phone(b) {
            reasons.push(MatchReason::Phone);
        }
    }

    let company = normalize_company(&lead.company_name);
    if !company.is_empty() && company == normalize_company(&candidate.company_name) {
        reasons.push(MatchReason::Company);
    }

    reasons
}

/// Other active leads in the same org that look like `lead`
pub async fn find_duplicates(
    repo: &dyn Repository<LeadDoc>,
    lead: &LeadDoc,
) -> Result<Vec<DuplicateMatch>> {
    let candidates = repo
        .find_many(doc! {
            "org_id": &lead.org_id,
            "status": LeadStatus::Active,
            "id": { "$ne": &lead.id },
        })
        .await?;

    Ok(candidates
        .iter()
        .filter_map(|candidate| {
            let reasons = match_reasons(lead, candidate);
            (!reasons.is_empty()).then(|| DuplicateMatch {
                lead_id: candidate.id.clone(),
                company_name: candidate.company_name.clone(),
                reasons,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_company() {
        assert_eq!(normalize_company("Acme, Inc."), "acme");
        assert_eq!(normalize_company("ACME Pvt. Ltd"), "acme");
        assert_eq!(normalize_company("Globex GmbH & Co"), "globex");
        assert_eq!(normalize_company("  Initech   Software LLC "), "initech software");
        // A bare suffix is kept rather than collapsing to nothing
        assert_eq!(normalize_company("Company"), "company");
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+1 (555) 010-9999"), "15550109999");
    }
}

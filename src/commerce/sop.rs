//! Lead SOP exit gates
//!
//! A lead leaves a stage only when that stage's gate holds. Gates are pure
//! checks over the lead; anything that needs storage (duplicates) is looked
//! up by the caller and passed in.

use regex::Regex;
use std::sync::OnceLock;

use crate::commerce::dedupe::DuplicateMatch;
use crate::commerce::scoring::PASSING_SCORE;
use crate::db::schemas::{LeadDoc, LeadStage};

/// BANT answers that must be "yes" to pass qualification
pub const MIN_BANT_YES: usize = 3;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("static regex")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

/// 7 to 15 digits once formatting is removed
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=15).contains(&digits)
        && phone
            .chars()
            .all(|c| c.is_ascii_digit() || " +-().".contains(c))
}

fn has_contact(lead: &LeadDoc) -> bool {
    let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    filled(&lead.email) || filled(&lead.phone)
}

/// Check the exit gate of the lead's current stage.
///
/// `duplicates` is only consulted at the deduplicate stage; `force` only
/// overrides that gate.
pub fn check_exit_gate(
    lead: &LeadDoc,
    duplicates: &[DuplicateMatch],
    force: bool,
) -> Result<(), String> {
    match lead.stage {
        LeadStage::Intake => {
            if lead.company_name.trim().is_empty() {
                return Err("company_name is required".into());
            }
            if !has_contact(lead) {
                return Err("an email or phone number is required".into());
            }
        }
        LeadStage::Enrich => {
            if lead.enrichment.is_none() {
                return Err("enrichment data has not been recorded".into());
            }
        }
        LeadStage::Validate => {
            if let Some(email) = lead.email.as_deref().filter(|e| !e.trim().is_empty()) {
                if !is_valid_email(email) {
                    return Err(format!("email '{email}' is not valid"));
                }
            }
            if let Some(phone) = lead.phone.as_deref().filter(|p| !p.trim().is_empty()) {
                if !is_valid_phone(phone) {
                    return Err(format!("phone '{phone}' must have 7 to 15 digits"));
                }
            }
        }
        LeadStage::Deduplicate => {
            if !force && !duplicates.is_empty() {
                let ids: Vec<&str> = duplicates.iter().map(|d| d.lead_id.as_str()).collect();
                return Err(format!(
                    "possible duplicate of {} (advance with force to override)",
                    ids.join(", ")
                ));
            }
        }
        LeadStage::Qualify => match lead.qualification {
            None => return Err("BANT qualification has not been recorded".into()),
            Some(q) if q.answered_yes() < MIN_BANT_YES => {
                return Err(format!(
                    "only {} of 4 BANT criteria met, {} required",
                    q.answered_yes(),
                    MIN_BANT_YES
                ));
            }
            Some(_) => {}
        },
        LeadStage::Score => match &lead.score {
            None => return Err("lead has not been scored".into()),
            Some(score) if score.total < PASSING_SCORE => {
                return Err(format!(
                    "score {} is below the required {}",
                    score.total, PASSING_SCORE
                ));
            }
            Some(_) => {}
        },
        LeadStage::Route => {
            if lead.assigned_to.is_none() {
                return Err("lead must be assigned before engagement".into());
            }
        }
        LeadStage::Engage => {
            if lead.activities.is_empty() {
                return Err("at least one activity must be logged".into());
            }
        }
        LeadStage::Convert => return Err("lead is already at the final stage".into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("ops@acme.io"));
        assert!(is_valid_email("first.last+tag@mail.acme.co.uk"));
        assert!(!is_valid_email("ops@acme"));
        assert!(!is_valid_email("ops acme.io"));
        assert!(!is_valid_email("@acme.io"));
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("+1 (555) 010-9999"));
        assert!(is_valid_phone("5550100"));
        assert!(!is_valid_phone("555010"));
        assert!(!is_valid_phone("1234567890123456"));
        assert!(!is_valid_phone("555-CALL-NOW"));
    }
}

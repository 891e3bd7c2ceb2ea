//! Rule-based lead scoring
//!
//! Six factors add up to at most 100 points:
//!
//! | factor      | max |
//! |-------------|-----|
//! | deal value  | 25  |
//! | company size| 15  |
//! | enrichment  | 10  |
//! | BANT        | 32  |
//! | source      | 10  |
//! | engagement  |  8  |

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::db::schemas::{LeadDoc, LeadScore, ScoreBand, ScoreComponent};

pub const HOT_THRESHOLD: u8 = 70;
pub const WARM_THRESHOLD: u8 = 40;

/// Minimum score a lead needs to leave the score stage
pub const PASSING_SCORE: u8 = WARM_THRESHOLD;

fn value_points(value: Option<Decimal>) -> u8 {
    match value {
        Some(v) if v >= dec!(500000) => 25,
        Some(v) if v >= dec!(100000) => 20,
        Some(v) if v >= dec!(25000) => 12,
        Some(v) if v > Decimal::ZERO => 5,
        _ => 0,
    }
}

fn size_points(employees: Option<u32>) -> u8 {
    match employees {
        Some(n) if n >= 1000 => 15,
        Some(n) if n >= 200 => 12,
        Some(n) if n >= 50 => 8,
        Some(n) if n >= 1 => 4,
        _ => 0,
    }
}

fn enrichment_points(lead: &LeadDoc) -> u8 {
    let Some(e) = &lead.enrichment else {
        return 0;
    };
    let filled = [
        e.website.is_some() || e.domain.is_some(),
        e.linkedin.is_some(),
        e.annual_revenue.is_some(),
        e.employee_count.is_some(),
        e.industry.is_some() || lead.industry.is_some(),
    ];
    2 * filled.into_iter().filter(|f| *f).count() as u8
}

fn source_points(source: &str) -> u8 {
    match source.trim().to_lowercase().as_str() {
        "referral" => 10,
        "inbound" | "website" | "partner" => 8,
        "event" | "trade_show" => 6,
        "outbound" | "cold_call" => 4,
        _ => 2,
    }
}

pub fn band_for(total: u8) -> ScoreBand {
    if total >= HOT_THRESHOLD {
        ScoreBand::Hot
    } else if total >= WARM_THRESHOLD {
        ScoreBand::Warm
    } else {
        ScoreBand::Cold
    }
}

/// Score a lead from what is currently recorded on it
pub fn score_lead(lead: &LeadDoc) -> LeadScore {
    let employees = lead
        .employee_count
        .or_else(|| lead.enrichment.as_ref().and_then(|e| e.employee_count));
    let bant = lead.qualification.map(|q| q.answered_yes()).unwrap_or(0) as u8;
    let engagement = lead.activities.len().min(4) as u8;

    let components = vec![
        ScoreComponent {
            factor: "deal_value".into(),
            points: value_points(lead.estimated_value),
        },
        ScoreComponent {
            factor: "company_size".into(),
            points: size_points(employees),
        },
        ScoreComponent {
            factor: "enrichment".into(),
            points: enrichment_points(lead),
        },
        ScoreComponent {
            factor: "bant".into(),
            points: 8 * bant,
        },
        ScoreComponent {
            factor: "source".into(),
            points: source_points(&lead.source),
        },
        ScoreComponent {
            factor: "engagement".into(),
            points: 2 * engagement,
        },
    ];

    let total = components.iter().map(|c| c.points).sum::<u8>().min(100);
    LeadScore {
        total,
        band: band_for(total),
        components,
        scored_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{Enrichment, LeadStage, LeadStatus, Metadata, Qualification};

    fn bare_lead() -> LeadDoc {
        LeadDoc {
            id: "l1".into(),
            metadata: Metadata::new(),
            org_id: "o".into(),
            company_name: "Acme".into(),
            contact_name: None,
            email: None,
            phone: None,
            country: None,
            industry: None,
            source: "unknown".into(),
            estimated_value: None,
            employee_count: None,
            notes: None,
            stage: LeadStage::Score,
            status: LeadStatus::Active,
            enrichment: None,
            qualification: None,
            score: None,
            assigned_to: None,
            activities: vec![],
            possible_duplicates: vec![],
            stage_history: vec![],
            audit_trail: vec![],
            disqualification_reason: None,
            converted_at: None,
            created_by: "u".into(),
        }
    }

    #[test]
    fn test_empty_lead_is_cold() {
        let score = score_lead(&bare_lead());
        assert_eq!(score.total, 2);
        assert_eq!(score.band, ScoreBand::Cold);
        assert_eq!(score.components.len(), 6);
    }

    #[test]
    fn test_maximal_lead_scores_100() {
        let mut lead = bare_lead();
        lead.source = "referral".into();
        lead.estimated_value = Some(dec!(750000));
        lead.employee_count = Some(5000);
        lead.industry = Some("Steel".into());
        lead.enrichment = Some(Enrichment {
            website: Some("https://acme.test".into()),
            domain: None,
            linkedin: Some("acme".into()),
            annual_revenue: Some(dec!(1000000)),
            employee_count: Some(5000),
            industry: None,
            notes: None,
            enriched_at: Utc::now(),
            enriched_by: "u".into(),
        });
        lead.qualification = Some(Qualification {
            budget: true,
            authority: true,
            need: true,
            timeline: true,
        });
        for _ in 0..6 {
            lead.activities.push(crate::db::schemas::Activity {
                kind: "call".into(),
                summary: "hi".into(),
                by: "u".into(),
                at: Utc::now(),
            });
        }

        let score = score_lead(&lead);
        assert_eq!(score.total, 100);
        assert_eq!(score.band, ScoreBand::Hot);
    }

    #[test]
    fn test_bands() {
        assert_eq!(band_for(70), ScoreBand::Hot);
        assert_eq!(band_for(69), ScoreBand::Warm);
        assert_eq!(band_for(40), ScoreBand::Warm);
        assert_eq!(band_for(39), ScoreBand::Cold);
    }

    #[test]
    fn test_deterministic() {
        let mut lead = bare_lead();
        lead.estimated_value = Some(dec!(120000));
        lead.source = "website".into();
        let a = score_lead(&lead);
        let b = score_lead(&lead);
        assert_eq!(a.total, b.total);
        assert_eq!(a.total, 20 + 8);
    }
}

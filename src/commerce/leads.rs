//! Lead SOP service
//!
//! Every state change is a version-checked read-modify-write retried on
//! conflict, so gates are evaluated against the latest stored lead and
//! concurrent writers never overwrite each other.

use bson::{doc, Document};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthContext;
use crate::commerce::dedupe::{find_duplicates, DuplicateMatch};
use crate::commerce::scoring::score_lead;
use crate::commerce::sop::check_exit_gate;
use crate::db::schemas::{
    normalize_email, Activity, Enrichment, LeadDoc, LeadScore, LeadStage, LeadStatus, Metadata,
    Qualification, StageTransition,
};
use crate::db::repository::MAX_WRITE_ATTEMPTS;
use crate::db::{get_scoped, modify_scoped, retry_on_conflict, Stores};
use crate::logging::{AuditEvent, AuditLogger};
use crate::tenancy::ensure_member;
use crate::types::{IbError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLeadRequest {
    pub company_name: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub estimated_value: Option<Decimal>,
    #[serde(default)]
    pub employee_count: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Create even when an active lead has the same email
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichLeadRequest {
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub annual_revenue: Option<Decimal>,
    #[serde(default)]
    pub employee_count: Option<u32>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogActivityRequest {
    pub kind: String,
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignLeadRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvanceLeadRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisqualifyLeadRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadFilter {
    pub stage: Option<LeadStage>,
    pub status: Option<LeadStatus>,
    pub assigned_to: Option<String>,
}

impl LeadFilter {
    fn into_document(self, org_id: &str) -> Document {
        let mut filter = doc! { "org_id": org_id };
        if let Some(stage) = self.stage {
            filter.insert("stage", stage);
        }
        if let Some(status) = self.status {
            filter.insert("status", status);
        }
        if let Some(assignee) = self.assigned_to {
            filter.insert("assigned_to", assignee);
        }
        filter
    }
}

fn ensure_active(lead: &LeadDoc) -> Result<()> {
    match lead.status {
        LeadStatus::Active => Ok(()),
        other => Err(IbError::Conflict(format!("Lead is {other}"))),
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Host part of a URL, or the domain of an email address
fn derive_domain(website: Option<&str>, email: Option<&str>) -> Option<String> {
    if let Some(site) = website {
        let without_scheme = site.split("://").last().unwrap_or(site);
        let host = without_scheme.split(['/', '?', '#']).next().unwrap_or_default();
        let host = host.trim_start_matches("www.");
        if !host.is_empty() {
            return Some(host.to_lowercase());
        }
    }
    email
        .and_then(|e| e.rsplit_once('@'))
        .map(|(_, domain)| domain.to_lowercase())
}

#[derive(Clone)]
pub struct LeadService {
    stores: Stores,
    audit: AuditLogger,
}

impl LeadService {
    pub fn new(stores: Stores, audit: AuditLogger) -> Self {
        Self { stores, audit }
    }

    /// Intake: create a lead at the first SOP stage
    pub async fn create_lead(&self, ctx: &AuthContext, req: CreateLeadRequest) -> Result<LeadDoc> {
        let company_name = req.company_name.trim().to_string();
        if company_name.is_empty() {
            return Err(IbError::Validation("company_name is required".into()));
        }
        let email = clean(req.email).map(|e| normalize_email(&e));
        let phone = clean(req.phone);
        if email.is_none() && phone.is_none() {
            return Err(IbError::Validation("an email or phone number is required".into()));
        }
        if req.estimated_value.is_some_and(|v| v.is_sign_negative()) {
            return Err(IbError::Validation("estimated_value must not be negative".into()));
        }

        let now = Utc::now();
        let mut lead = LeadDoc {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            company_name,
            contact_name: clean(req.contact_name),
            email,
            phone,
            country: clean(req.country),
            industry: clean(req.industry),
            source: clean(req.source).unwrap_or_else(|| "manual".to_string()),
            estimated_value: req.estimated_value,
            employee_count: req.employee_count,
            notes: clean(req.notes),
            stage: LeadStage::Intake,
            status: LeadStatus::Active,
            enrichment: None,
            qualification: None,
            score: None,
            assigned_to: None,
            activities: Vec::new(),
            possible_duplicates: Vec::new(),
            stage_history: vec![StageTransition {
                from: None,
                to: LeadStage::Intake,
                by: ctx.user_id.clone(),
                at: now,
                forced: false,
            }],
            audit_trail: Vec::new(),
            disqualification_reason: None,
            converted_at: None,
            created_by: ctx.user_id.clone(),
        };

        let duplicates = find_duplicates(self.stores.leads.as_ref(), &lead).await?;
        if let Some(exact) = duplicates.iter().find(|d| d.is_email_match()) {
            if !req.force {
                return Err(IbError::Conflict(format!(
                    "An active lead with this email already exists ({})",
                    exact.lead_id
                )));
            }
        }
        lead.possible_duplicates = duplicates.iter().map(|d| d.lead_id.clone()).collect();
        lead.record("created", &ctx.user_id, None);

        let lead = self.stores.leads.insert(lead).await?;
        info!(lead_id = %lead.id, org_id = %lead.org_id, "Lead created");
        self.audit.record(ctx, "lead.created", "lead", &lead.id).await;
        Ok(lead)
    }

    pub async fn get_lead(&self, ctx: &AuthContext, id: &str) -> Result<LeadDoc> {
        get_scoped(self.stores.leads.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_leads(&self, ctx: &AuthContext, filter: LeadFilter) -> Result<Vec<LeadDoc>> {
        self.stores
            .leads
            .find_many(filter.into_document(&ctx.org_id))
            .await
    }

    pub async fn duplicates(&self, ctx: &AuthContext, id: &str) -> Result<Vec<DuplicateMatch>> {
        let lead = self.get_lead(ctx, id).await?;
        find_duplicates(self.stores.leads.as_ref(), &lead).await
    }

    pub async fn enrich_lead(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: EnrichLeadRequest,
    ) -> Result<LeadDoc> {
        if req.annual_revenue.is_some_and(|v| v.is_sign_negative()) {
            return Err(IbError::Validation("annual_revenue must not be negative".into()));
        }

        let lead = modify_scoped(self.stores.leads.as_ref(), &ctx.org_id, id, |lead| {
            ensure_active(lead)?;
            let website = clean(req.website.clone());
            let enrichment = Enrichment {
                domain: derive_domain(website.as_deref(), lead.email.as_deref()),
                website,
                linkedin: clean(req.linkedin.clone()),
                annual_revenue: req.annual_revenue,
                employee_count: req.employee_count,
                industry: clean(req.industry.clone()),
                notes: clean(req.notes.clone()),
                enriched_at: Utc::now(),
                enriched_by: ctx.user_id.clone(),
            };
            if lead.industry.is_none() {
                lead.industry = enrichment.industry.clone();
            }
            if lead.employee_count.is_none() {
                lead.employee_count = enrichment.employee_count;
            }
            lead.enrichment = Some(enrichment);
            lead.record("enriched", &ctx.user_id, None);
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "lead.enriched", "lead", &lead.id).await;
        Ok(lead)
    }

    pub async fn qualify_lead(
        &self,
        ctx: &AuthContext,
        id: &str,
        answers: Qualification,
    ) -> Result<LeadDoc> {
        let lead = modify_scoped(self.stores.leads.as_ref(), &ctx.org_id, id, |lead| {
            ensure_active(lead)?;
            lead.qualification = Some(answers);
            lead.record(
                "qualified",
                &ctx.user_id,
                Some(format!("{} of 4 BANT criteria met", answers.answered_yes())),
            );
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "lead.qualified", "lead", &lead.id).await;
        Ok(lead)
    }

    /// Recompute and store the score without moving the lead
    pub async fn rescore_lead(&self, ctx: &AuthContext, id: &str) -> Result<LeadScore> {
        let lead = modify_scoped(self.stores.leads.as_ref(), &ctx.org_id, id, |lead| {
            ensure_active(lead)?;
            let score = score_lead(lead);
            lead.record("scored", &ctx.user_id, Some(format!("{} ({})", score.total, score.band)));
            lead.score = Some(score);
            Ok(())
        })
        .await?;

        lead.score
            .ok_or_else(|| IbError::Internal("score missing after scoring".into()))
    }

    pub async fn log_activity(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: LogActivityRequest,
    ) -> Result<LeadDoc> {
        if req.kind.trim().is_empty() || req.summary.trim().is_empty() {
            return Err(IbError::Validation("kind and summary are required".into()));
        }

        let lead = modify_scoped(self.stores.leads.as_ref(), &ctx.org_id, id, |lead| {
            ensure_active(lead)?;
            lead.activities.push(Activity {
                kind: req.kind.trim().to_lowercase(),
                summary: req.summary.trim().to_string(),
                by: ctx.user_id.clone(),
                at: Utc::now(),
            });
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "lead.activity_logged", "lead", &lead.id).await;
        Ok(lead)
    }

    pub async fn assign_lead(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: AssignLeadRequest,
    ) -> Result<LeadDoc> {
        let assignee = ensure_member(&self.stores, &ctx.org_id, &req.user_id).await?;

        let lead = modify_scoped(self.stores.leads.as_ref(), &ctx.org_id, id, |lead| {
            ensure_active(lead)?;
            lead.assigned_to = Some(assignee.id.clone());
            lead.record("assigned", &ctx.user_id, Some(assignee.email.clone()));
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "lead.assigned", "lead", &lead.id).await;
        Ok(lead)
    }

    /// Move the lead to the next SOP stage if the current stage's gate holds
    pub async fn advance_lead(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: AdvanceLeadRequest,
    ) -> Result<LeadDoc> {
        let force = req.force;

        // Duplicates depend on the stage read in this attempt, so the lookup
        // is redone whenever a lost race forces a re-read.
        let lead = retry_on_conflict(MAX_WRITE_ATTEMPTS, move || async move {
            let mut lead = self.get_lead(ctx, id).await?;
            ensure_active(&lead)?;
            let duplicates = if lead.stage == LeadStage::Deduplicate {
                find_duplicates(self.stores.leads.as_ref(), &lead).await?
            } else {
                Vec::new()
            };
            check_exit_gate(&lead, &duplicates, force).map_err(|reason| {
                IbError::Gate(format!("Cannot leave stage '{}': {}", lead.stage, reason))
            })?;

            let from = lead.stage;
            let to = from
                .next()
                .ok_or_else(|| IbError::Gate("Lead is already at the final stage".into()))?;
            let now = Utc::now();

            lead.stage = to;
            lead.stage_history.push(StageTransition {
                from: Some(from),
                to,
                by: ctx.user_id.clone(),
                at: now,
                forced: force && from == LeadStage::Deduplicate && !duplicates.is_empty(),
            });

            match to {
                LeadStage::Score => lead.score = Some(score_lead(&lead)),
                LeadStage::Convert => {
                    lead.status = LeadStatus::Converted;
                    lead.converted_at = Some(now);
                }
                _ => {}
            }

            lead.record("advanced", &ctx.user_id, Some(format!("{from} -> {to}")));
            self.stores.leads.update(lead).await
        })
        .await?;

        info!(lead_id = %lead.id, stage = %lead.stage, "Lead advanced");
        self.audit
            .log(
                AuditEvent::new("lead.advanced", "lead", &lead.id)
                    .by(ctx)
                    .with_detail(serde_json::json!({ "stage": lead.stage })),
            )
            .await;
        Ok(lead)
    }

    pub async fn disqualify_lead(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: DisqualifyLeadRequest,
    ) -> Result<LeadDoc> {
        let reason = req.reason.trim().to_string();
        if reason.is_empty() {
            return Err(IbError::Validation("reason is required".into()));
        }

        let lead = modify_scoped(self.stores.leads.as_ref(), &ctx.org_id, id, |lead| {
            ensure_active(lead)?;
            lead.status = LeadStatus::Disqualified;
            lead.disqualification_reason = Some(reason.clone());
            lead.record("disqualified", &ctx.user_id, Some(reason.clone()));
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "lead.disqualified", "lead", &lead.id).await;
        Ok(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::repository::racing::RacingRepository;
    use crate::db::schemas::UserDoc;
    use crate::db::Repository;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn setup() -> (LeadService, AuthContext, Stores) {
        let stores = Stores::memory();
        let user = stores
            .users
            .insert(UserDoc::new("org-1", "rep@acme.io", "Rep", String::new(), Role::Sales))
            .await
            .unwrap();
        let service = LeadService::new(stores.clone(), AuditLogger::new());
        (service, AuthContext::from_user(&user), stores)
    }

    fn new_lead(company: &str, email: &str) -> CreateLeadRequest {
        CreateLeadRequest {
            company_name: company.into(),
            contact_name: Some("Pat".into()),
            email: Some(email.into()),
            phone: Some("+44 20 7946 0000".into()),
            country: None,
            industry: None,
            source: Some("referral".into()),
            estimated_value: Some(dec!(250000)),
            employee_count: Some(300),
            notes: None,
            force: false,
        }
    }

    fn gate_reason(err: IbError) -> String {
        match err {
            IbError::Gate(reason) => reason,
            other => panic!("expected gate error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_intake_requires_contact() {
        let (service, ctx, _) = setup().await;
        let mut req = new_lead("Acme", "x@acme.io");
        req.email = None;
        req.phone = None;
        assert!(matches!(
            service.create_lead(&ctx, req).await,
            Err(IbError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_exact_email_duplicate_needs_force() {
        let (service, ctx, _) = setup().await;
        service.create_lead(&ctx, new_lead("Acme", "buyer@acme.io")).await.unwrap();

        let err = service
            .create_lead(&ctx, new_lead("Other", "Buyer@Acme.io"))
            .await
            .unwrap_err();
        assert!(matches!(err, IbError::Conflict(_)));

        let mut forced = new_lead("Other", "buyer@acme.io");
        forced.force = true;
        let lead = service.create_lead(&ctx, forced).await.unwrap();
        assert_eq!(lead.possible_duplicates.len(), 1);
    }

    #[tokio::test]
    async fn test_full_sop_walk() {
        let (service, ctx, _) = setup().await;
        let lead = service.create_lead(&ctx, new_lead("Acme Ltd", "buyer@acme.io")).await.unwrap();
        let id = lead.id.as_str();
        let advance = || service.advance_lead(&ctx, id, AdvanceLeadRequest::default());

        // intake -> enrich
        assert_eq!(advance().await.unwrap().stage, LeadStage::Enrich);

        // enrich gate
        let reason = gate_reason(advance().await.unwrap_err());
        assert!(reason.contains("enrichment"));
        let enriched = service
            .enrich_lead(
                &ctx,
                id,
                EnrichLeadRequest {
                    website: Some("https://www.acme.io/about".into()),
                    linkedin: Some("acme".into()),
                    annual_revenue: Some(dec!(5000000)),
                    employee_count: None,
                    industry: Some("Manufacturing".into()),
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(
            enriched.enrichment.as_ref().and_then(|e| e.domain.as_deref()),
            Some("acme.io")
        );

        assert_eq!(advance().await.unwrap().stage, LeadStage::Validate);
        assert_eq!(advance().await.unwrap().stage, LeadStage::Deduplicate);
        assert_eq!(advance().await.unwrap().stage, LeadStage::Qualify);

        // qualify gate: 2 of 4 is not enough
        service
            .qualify_lead(
                &ctx,
                id,
                Qualification {
                    budget: true,
                    authority: true,
                    need: false,
                    timeline: false,
                },
            )
            .await
            .unwrap();
        assert!(gate_reason(advance().await.unwrap_err()).contains("BANT"));
        service
            .qualify_lead(
                &ctx,
                id,
                Qualification {
                    budget: true,
                    authority: true,
                    need: true,
                    timeline: false,
                },
            )
            .await
            .unwrap();

        // entering score computes it
        let scored = advance().await.unwrap();
        assert_eq!(scored.stage, LeadStage::Score);
        assert!(scored.score.as_ref().unwrap().total >= 40);

        assert_eq!(advance().await.unwrap().stage, LeadStage::Route);
        assert!(gate_reason(advance().await.unwrap_err()).contains("assigned"));
        service
            .assign_lead(&ctx, id, AssignLeadRequest { user_id: ctx.user_id.clone() })
            .await
            .unwrap();

        assert_eq!(advance().await.unwrap().stage, LeadStage::Engage);
        assert!(gate_reason(advance().await.unwrap_err()).contains("activity"));
        service
            .log_activity(
                &ctx,
                id,
                LogActivityRequest {
                    kind: "Call".into(),
                    summary: "Intro call".into(),
                },
            )
            .await
            .unwrap();

        let converted = advance().await.unwrap();
        assert_eq!(converted.stage, LeadStage::Convert);
        assert_eq!(converted.status, LeadStatus::Converted);
        assert!(converted.converted_at.is_some());
        assert_eq!(converted.stage_history.len(), 9);

        // terminal
        assert!(advance().await.is_err());
    }

    #[tokio::test]
    async fn test_validate_gate_rejects_bad_phone() {
        let (service, ctx, _) = setup().await;
        let mut req = new_lead("Acme", "buyer@acme.io");
        req.phone = Some("12-34".into());
        let lead = service.create_lead(&ctx, req).await.unwrap();
        let id = lead.id.as_str();

        service.advance_lead(&ctx, id, AdvanceLeadRequest::default()).await.unwrap();
        service
            .enrich_lead(
                &ctx,
                id,
                EnrichLeadRequest {
                    website: None,
                    linkedin: None,
                    annual_revenue: None,
                    employee_count: None,
                    industry: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        service.advance_lead(&ctx, id, AdvanceLeadRequest::default()).await.unwrap();

        let err = service
            .advance_lead(&ctx, id, AdvanceLeadRequest::default())
            .await
            .unwrap_err();
        assert!(gate_reason(err).contains("phone"));
    }

    #[tokio::test]
    async fn test_dedupe_gate_and_force() {
        let (service, ctx, _) = setup().await;
        service.create_lead(&ctx, new_lead("Globex Inc", "a@globex.io")).await.unwrap();
        let lead = service
            .create_lead(&ctx, new_lead("GLOBEX", "b@globex.io"))
            .await
            .unwrap();
        let id = lead.id.as_str();

        service.advance_lead(&ctx, id, AdvanceLeadRequest::default()).await.unwrap();
        service
            .enrich_lead(
                &ctx,
                id,
                EnrichLeadRequest {
                    website: None,
                    linkedin: None,
                    annual_revenue: None,
                    employee_count: None,
                    industry: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        service.advance_lead(&ctx, id, AdvanceLeadRequest::default()).await.unwrap();
        service.advance_lead(&ctx, id, AdvanceLeadRequest::default()).await.unwrap();

        let err = service
            .advance_lead(&ctx, id, AdvanceLeadRequest::default())
            .await
            .unwrap_err();
        assert!(gate_reason(err).contains("duplicate"));

        let forced = service
            .advance_lead(&ctx, id, AdvanceLeadRequest { force: true })
            .await
            .unwrap();
        assert_eq!(forced.stage, LeadStage::Qualify);
        assert!(forced.stage_history.last().unwrap().forced);
    }

    #[tokio::test]
    async fn test_lost_advance_race_rechecks_dedupe_gate() {
        let mut stores = Stores::memory();
        let racing = Arc::new(RacingRepository::new(stores.leads.clone()));
        stores.leads = racing.clone() as Arc<dyn Repository<LeadDoc>>;
        let user = stores
            .users
            .insert(UserDoc::new("org-1", "rep@acme.io", "Rep", String::new(), Role::Sales))
            .await
            .unwrap();
        let ctx = AuthContext::from_user(&user);
        let service = LeadService::new(stores, AuditLogger::new());

        service.create_lead(&ctx, new_lead("Globex Inc", "a@globex.io")).await.unwrap();
        let lead = service
            .create_lead(&ctx, new_lead("GLOBEX", "b@globex.io"))
            .await
            .unwrap();
        let id = lead.id.as_str();
        service.advance_lead(&ctx, id, AdvanceLeadRequest::default()).await.unwrap();
        service
            .enrich_lead(
                &ctx,
                id,
                EnrichLeadRequest {
                    website: None,
                    linkedin: None,
                    annual_revenue: None,
                    employee_count: None,
                    industry: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        let at_validate = service.advance_lead(&ctx, id, AdvanceLeadRequest::default()).await.unwrap();
        assert_eq!(at_validate.stage, LeadStage::Validate);

        // A concurrent advance moves the lead to deduplicate first
        racing.race_next_update(|lead: &mut LeadDoc| lead.stage = LeadStage::Deduplicate);

        let err = service
            .advance_lead(&ctx, id, AdvanceLeadRequest::default())
            .await
            .unwrap_err();
        assert!(gate_reason(err).contains("duplicate"));
        assert_eq!(service.get_lead(&ctx, id).await.unwrap().stage, LeadStage::Deduplicate);
    }

    #[tokio::test]
    async fn test_disqualified_lead_is_frozen() {
        let (service, ctx, _) = setup().await;
        let lead = service.create_lead(&ctx, new_lead("Acme", "a@acme.io")).await.unwrap();
        service
            .disqualify_lead(&ctx, &lead.id, DisqualifyLeadRequest { reason: "No budget".into() })
            .await
            .unwrap();

        let err = service
            .advance_lead(&ctx, &lead.id, AdvanceLeadRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IbError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_leads_are_tenant_scoped() {
        let (service, ctx, stores) = setup().await;
        let lead = service.create_lead(&ctx, new_lead("Acme", "a@acme.io")).await.unwrap();

        let outsider = stores
            .users
            .insert(UserDoc::new("org-2", "spy@other.io", "Spy", String::new(), Role::Sales))
            .await
            .unwrap();
        let outsider = AuthContext::from_user(&outsider);

        assert!(matches!(
            service.get_lead(&outsider, &lead.id).await,
            Err(IbError::NotFound(_))
        ));
        assert!(service
            .list_leads(&outsider, LeadFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            service
                .assign_lead(&ctx, &lead.id, AssignLeadRequest { user_id: outsider.user_id.clone() })
                .await,
            Err(IbError::NotFound(_)) | Err(IbError::Validation(_))
        ));
    }
}

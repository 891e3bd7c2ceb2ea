//! Deal workflow: Evaluate → Commit → Contract → Handoff
//!
//! Each hop claims its upstream record (sets the link id under a version
//! check) before creating the downstream one, so two callers racing on the
//! same evaluation or contract cannot both get through.

use bson::doc;
use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::auth::{AuthContext, Role};
use crate::commerce::approval_matrix::ApprovalPolicy;
use crate::db::schemas::{
    ApprovalDecision, CommitDoc, CommitStatus, ContractDoc, ContractStatus, DealFigures, DealKind,
    DealLine, Decision, EvaluationDoc, EvaluationStatus, HandoffDoc, HandoffStatus, LeadStatus,
    Metadata, RiskFactor, SourceRef,
};
use crate::db::{get_scoped, modify_scoped, Stores};
use crate::finance::money::{ensure_non_negative, ensure_positive, line_amount, normalize_currency, round2};
use crate::finance::{BillingLineInput, CreateBillingRequest, CreatePayableRequest, FinanceService};
use crate::logging::{AuditEvent, AuditLogger};
use crate::tenancy::ensure_member;
use crate::types::{IbError, Result};

/// Payment terms for billings raised by a revenue handoff
const HANDOFF_BILLING_DUE_DAYS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEvaluationRequest {
    pub kind: DealKind,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub counterparty: Option<String>,
    pub currency: String,
    #[serde(default)]
    pub line_items: Vec<DealLine>,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEvaluationRequest {
    pub counterparty: Option<String>,
    pub currency: Option<String>,
    pub line_items: Option<Vec<DealLine>>,
    pub risk_factors: Option<Vec<RiskFactor>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommitRequest {
    pub evaluation_id: String,
}

/// Approve/reject body shared by commits and workspace approval requests
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContractRequest {
    pub commit_id: String,
    pub title: String,
    #[serde(default)]
    pub terms: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignContractRequest {
    pub signed_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHandoffRequest {
    pub contract_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Counts per stage and status across the pipeline
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSummary {
    pub leads_by_stage: BTreeMap<String, u64>,
    pub leads_by_status: BTreeMap<String, u64>,
    pub evaluations: BTreeMap<String, u64>,
    pub commits: BTreeMap<String, u64>,
    pub contracts: BTreeMap<String, u64>,
    pub handoffs: BTreeMap<String, u64>,
}

fn tally<T>(items: &[T], key: impl Fn(&T) -> &'static str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(key(item).to_string()).or_insert(0) += 1;
    }
    counts
}

fn validate_lines(lines: &[DealLine]) -> Result<Vec<DealLine>> {
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let n = index + 1;
            if line.description.trim().is_empty() {
                return Err(IbError::Validation(format!("Line {n}: description is required")));
            }
            ensure_positive(&format!("Line {n}: quantity"), line.quantity)?;
            ensure_non_negative(&format!("Line {n}: unit_price"), line.unit_price)?;
            ensure_non_negative(&format!("Line {n}: unit_cost"), line.unit_cost)?;
            Ok(DealLine {
                description: line.description.trim().to_string(),
                ..line.clone()
            })
        })
        .collect()
}

fn validate_risks(factors: &[RiskFactor]) -> Result<()> {
    for factor in factors {
        if factor.name.trim().is_empty() {
            return Err(IbError::Validation("risk factor name is required".into()));
        }
        if factor.score < Decimal::ZERO || factor.score > Decimal::ONE_HUNDRED {
            return Err(IbError::Validation(format!(
                "Risk '{}': score must be between 0 and 100",
                factor.name
            )));
        }
        ensure_positive(&format!("Risk '{}': weight", factor.name), factor.weight)?;
    }
    Ok(())
}

/// Value, cost, margin and weighted risk for a deal
pub fn compute_figures(lines: &[DealLine], risks: &[RiskFactor]) -> DealFigures {
    let total_value: Decimal = lines.iter().map(|l| line_amount(l.quantity, l.unit_price)).sum();
    let total_cost: Decimal = lines.iter().map(|l| line_amount(l.quantity, l.unit_cost)).sum();

    let gross_margin_percent = if total_value.is_zero() {
        Decimal::ZERO
    } else {
        round2((total_value - total_cost) / total_value * Decimal::ONE_HUNDRED)
    };

    let total_weight: Decimal = risks.iter().map(|r| r.weight).sum();
    let risk_score = if total_weight.is_zero() {
        Decimal::ZERO
    } else {
        let weighted: Decimal = risks.iter().map(|r| r.score * r.weight).sum();
        round2(weighted / total_weight)
    };

    DealFigures {
        total_value,
        total_cost,
        gross_margin_percent,
        risk_score,
    }
}

#[derive(Clone)]
pub struct DealService {
    stores: Stores,
    audit: AuditLogger,
    policy: ApprovalPolicy,
    finance: FinanceService,
}

impl DealService {
    pub fn new(
        stores: Stores,
        audit: AuditLogger,
        policy: ApprovalPolicy,
        finance: FinanceService,
    ) -> Self {
        Self {
            stores,
            audit,
            policy,
            finance,
        }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    pub async fn create_evaluation(
        &self,
        ctx: &AuthContext,
        req: CreateEvaluationRequest,
    ) -> Result<EvaluationDoc> {
        let currency = normalize_currency(&req.currency)?;
        let line_items = validate_lines(&req.line_items)?;
        validate_risks(&req.risk_factors)?;

        let lead = match (&req.lead_id, req.kind) {
            (Some(lead_id), _) => {
                let lead = get_scoped(self.stores.leads.as_ref(), &ctx.org_id, lead_id).await?;
                if req.kind == DealKind::Revenue && lead.status != LeadStatus::Converted {
                    return Err(IbError::Conflict(format!(
                        "Lead '{}' is {}; only converted leads can be evaluated",
                        lead.id, lead.status
                    )));
                }
                Some(lead)
            }
            (None, DealKind::Revenue) => {
                return Err(IbError::Validation(
                    "Revenue evaluations need a converted lead (lead_id)".into(),
                ))
            }
            (None, DealKind::Procurement) => None,
        };

        let counterparty = req
            .counterparty
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .or_else(|| lead.as_ref().map(|l| l.company_name.clone()))
            .ok_or_else(|| IbError::Validation("counterparty is required".into()))?;

        let figures = compute_figures(&line_items, &req.risk_factors);
        let evaluation = EvaluationDoc {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            kind: req.kind,
            lead_id: lead.map(|l| l.id),
            counterparty,
            currency,
            line_items,
            risk_factors: req.risk_factors,
            notes: req.notes.filter(|n| !n.trim().is_empty()),
            figures,
            status: EvaluationStatus::Draft,
            commit_id: None,
            created_by: ctx.user_id.clone(),
            submitted_at: None,
        };

        let evaluation = self.stores.evaluations.insert(evaluation).await?;
        info!(evaluation_id = %evaluation.id, kind = %evaluation.kind, "Evaluation created");
        self.audit.record(ctx, "evaluation.created", "evaluation", &evaluation.id).await;
        Ok(evaluation)
    }

    pub async fn update_evaluation(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: UpdateEvaluationRequest,
    ) -> Result<EvaluationDoc> {
        let currency = req.currency.as_deref().map(normalize_currency).transpose()?;
        let line_items = req.line_items.as_deref().map(validate_lines).transpose()?;
        if let Some(risks) = &req.risk_factors {
            validate_risks(risks)?;
        }

        let evaluation = modify_scoped(self.stores.evaluations.as_ref(), &ctx.org_id, id, |e| {
            if e.status != EvaluationStatus::Draft {
                return Err(IbError::Conflict(format!(
                    "Only draft evaluations can be edited (evaluation is {})",
                    e.status
                )));
            }
            if let Some(counterparty) = req.counterparty.as_deref().map(str::trim) {
                if counterparty.is_empty() {
                    return Err(IbError::Validation("counterparty is required".into()));
                }
                e.counterparty = counterparty.to_string();
            }
            if let Some(currency) = &currency {
                e.currency = currency.clone();
            }
            if let Some(lines) = &line_items {
                e.line_items = lines.clone();
            }
            if let Some(risks) = &req.risk_factors {
                e.risk_factors = risks.clone();
            }
            if let Some(notes) = &req.notes {
                e.notes = Some(notes.clone()).filter(|n| !n.trim().is_empty());
            }
            e.figures = compute_figures(&e.line_items, &e.risk_factors);
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "evaluation.updated", "evaluation", &evaluation.id).await;
        Ok(evaluation)
    }

    pub async fn submit_evaluation(&self, ctx: &AuthContext, id: &str) -> Result<EvaluationDoc> {
        let evaluation = modify_scoped(self.stores.evaluations.as_ref(), &ctx.org_id, id, |e| {
            if e.status != EvaluationStatus::Draft {
                return Err(IbError::Conflict(format!("Evaluation is already {}", e.status)));
            }
            if e.line_items.is_empty() {
                return Err(IbError::Validation(
                    "An evaluation needs at least one line item".into(),
                ));
            }
            e.status = EvaluationStatus::Submitted;
            e.submitted_at = Some(Utc::now());
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "evaluation.submitted", "evaluation", &evaluation.id).await;
        Ok(evaluation)
    }

    pub async fn get_evaluation(&self, ctx: &AuthContext, id: &str) -> Result<EvaluationDoc> {
        get_scoped(self.stores.evaluations.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_evaluations(
        &self,
        ctx: &AuthContext,
        kind: Option<DealKind>,
        status: Option<EvaluationStatus>,
    ) -> Result<Vec<EvaluationDoc>> {
        let mut filter = doc! { "org_id": &ctx.org_id };
        if let Some(kind) = kind {
            filter.insert("kind", kind);
        }
        if let Some(status) = status {
            filter.insert("status", status);
        }
        self.stores.evaluations.find_many(filter).await
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Snapshot a submitted evaluation and work out who has to approve it
    pub async fn create_commit(
        &self,
        ctx: &AuthContext,
        req: CreateCommitRequest,
    ) -> Result<CommitDoc> {
        let commit_id = uuid::Uuid::new_v4().to_string();

        let evaluation = modify_scoped(
            self.stores.evaluations.as_ref(),
            &ctx.org_id,
            &req.evaluation_id,
            |e| {
                match e.status {
                    EvaluationStatus::Submitted if e.commit_id.is_none() => {}
                    EvaluationStatus::Draft => {
                        return Err(IbError::Conflict("Evaluation has not been submitted".into()))
                    }
                    _ => {
                        return Err(IbError::Conflict(
                            "Evaluation has already been committed".into(),
                        ))
                    }
                }
                e.status = EvaluationStatus::Committed;
                e.commit_id = Some(commit_id.clone());
                Ok(())
            },
        )
        .await?;

        let required_roles = self.policy.required_roles(evaluation.kind, &evaluation.figures);
        let status = if required_roles.is_empty() {
            CommitStatus::Approved
        } else {
            CommitStatus::PendingApproval
        };

        let commit = CommitDoc {
            id: commit_id,
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            kind: evaluation.kind,
            evaluation_id: evaluation.id.clone(),
            lead_id: evaluation.lead_id.clone(),
            counterparty: evaluation.counterparty.clone(),
            currency: evaluation.currency.clone(),
            line_items: evaluation.line_items.clone(),
            figures: evaluation.figures,
            required_roles,
            decisions: Vec::new(),
            status,
            contract_id: None,
            created_by: ctx.user_id.clone(),
            decided_at: (status == CommitStatus::Approved).then(Utc::now),
        };

        let commit = self.stores.commits.insert(commit).await?;
        info!(
            commit_id = %commit.id,
            required = ?commit.required_roles,
            "Commit created"
        );
        self.audit
            .log(
                AuditEvent::new("commit.created", "commit", &commit.id)
                    .by(ctx)
                    .with_detail(serde_json::json!({
                        "required_roles": commit.required_roles,
                        "figures": commit.figures,
                    })),
            )
            .await;
        Ok(commit)
    }

    /// Record the caller's role decision. The role must be required and
    /// undecided; a lost write race re-reads and re-checks both.
    pub async fn decide_commit(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: DecisionRequest,
    ) -> Result<CommitDoc> {
        let role = ctx.role;

        let commit = modify_scoped(self.stores.commits.as_ref(), &ctx.org_id, id, |commit| {
            if commit.status != CommitStatus::PendingApproval {
                return Err(IbError::Conflict(format!("Commit is already {}", commit.status)));
            }
            if !commit.required_roles.contains(&role) {
                return Err(IbError::Forbidden(format!(
                    "Role '{role}' is not an approver for this commit"
                )));
            }
            if commit.decisions.iter().any(|d| d.role == role) {
                return Err(IbError::Conflict(format!("Role '{role}' has already decided")));
            }

            let now = Utc::now();
            commit.decisions.push(ApprovalDecision {
                role,
                user_id: ctx.user_id.clone(),
                decision: req.decision,
                comment: req.comment.clone(),
                decided_at: now,
            });

            if req.decision == Decision::Reject {
                commit.status = CommitStatus::Rejected;
                commit.decided_at = Some(now);
            } else if commit.pending_roles().is_empty() {
                commit.status = CommitStatus::Approved;
                commit.decided_at = Some(now);
            }
            Ok(())
        })
        .await?;

        info!(commit_id = %commit.id, role = %role, decision = %req.decision, status = %commit.status, "Commit decision");
        let action = match commit.status {
            CommitStatus::Approved => "commit.approved",
            CommitStatus::Rejected => "commit.rejected",
            CommitStatus::PendingApproval => "commit.decision_recorded",
        };
        self.audit
            .log(
                AuditEvent::new(action, "commit", &commit.id)
                    .by(ctx)
                    .with_detail(serde_json::json!({
                        "role": role,
                        "decision": req.decision,
                        "pending": commit.pending_roles(),
                    })),
            )
            .await;
        Ok(commit)
    }

    pub async fn get_commit(&self, ctx: &AuthContext, id: &str) -> Result<CommitDoc> {
        get_scoped(self.stores.commits.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_commits(
        &self,
        ctx: &AuthContext,
        status: Option<CommitStatus>,
    ) -> Result<Vec<CommitDoc>> {
        let mut filter = doc! { "org_id": &ctx.org_id };
        if let Some(status) = status {
            filter.insert("status", status);
        }
        self.stores.commits.find_many(filter).await
    }

    // =========================================================================
    // Contract
    // =========================================================================

    pub async fn create_contract(
        &self,
        ctx: &AuthContext,
        req: CreateContractRequest,
    ) -> Result<ContractDoc> {
        let title = req.title.trim().to_string();
        if title.is_empty() {
            return Err(IbError::Validation("title is required".into()));
        }
        if req.end_date < req.start_date {
            return Err(IbError::Validation("end_date must not be before start_date".into()));
        }

        let contract_id = uuid::Uuid::new_v4().to_string();
        let commit = modify_scoped(self.stores.commits.as_ref(), &ctx.org_id, &req.commit_id, |c| {
            if c.status != CommitStatus::Approved {
                return Err(IbError::Conflict(format!(
                    "Commit is {}; a contract needs every required approval",
                    c.status
                )));
            }
            if c.contract_id.is_some() {
                return Err(IbError::Conflict("Commit already has a contract".into()));
            }
            c.contract_id = Some(contract_id.clone());
            Ok(())
        })
        .await?;

        let contract = ContractDoc {
            id: contract_id,
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            kind: commit.kind,
            commit_id: commit.id.clone(),
            evaluation_id: commit.evaluation_id.clone(),
            counterparty: commit.counterparty.clone(),
            currency: commit.currency.clone(),
            line_items: commit.line_items.clone(),
            total_value: commit.figures.total_value,
            title,
            terms: req.terms,
            start_date: req.start_date,
            end_date: req.end_date,
            status: ContractStatus::Draft,
            handoff_id: None,
            created_by: ctx.user_id.clone(),
            sent_at: None,
            signed_at: None,
            signed_by: None,
        };

        let contract = self.stores.contracts.insert(contract).await?;
        self.audit.record(ctx, "contract.created", "contract", &contract.id).await;
        Ok(contract)
    }

    pub async fn send_contract(&self, ctx: &AuthContext, id: &str) -> Result<ContractDoc> {
        let contract = modify_scoped(self.stores.contracts.as_ref(), &ctx.org_id, id, |c| {
            if c.status != ContractStatus::Draft {
                return Err(IbError::Conflict(format!("Contract is already {}", c.status)));
            }
            c.status = ContractStatus::Sent;
            c.sent_at = Some(Utc::now());
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "contract.sent", "contract", &contract.id).await;
        Ok(contract)
    }

    pub async fn sign_contract(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: SignContractRequest,
    ) -> Result<ContractDoc> {
        let signed_by = req.signed_by.trim().to_string();
        if signed_by.is_empty() {
            return Err(IbError::Validation("signed_by is required".into()));
        }

        let contract = modify_scoped(self.stores.contracts.as_ref(), &ctx.org_id, id, |c| {
            if c.status != ContractStatus::Sent {
                return Err(IbError::Conflict(format!(
                    "Only sent contracts can be signed (contract is {})",
                    c.status
                )));
            }
            c.status = ContractStatus::Signed;
            c.signed_at = Some(Utc::now());
            c.signed_by = Some(signed_by.clone());
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "contract.signed", "contract", &contract.id).await;
        Ok(contract)
    }

    pub async fn cancel_contract(&self, ctx: &AuthContext, id: &str) -> Result<ContractDoc> {
        let contract = modify_scoped(self.stores.contracts.as_ref(), &ctx.org_id, id, |c| {
            match c.status {
                ContractStatus::Draft | ContractStatus::Sent => {
                    c.status = ContractStatus::Cancelled;
                    Ok(())
                }
                other => Err(IbError::Conflict(format!("A {other} contract cannot be cancelled"))),
            }
        })
        .await?;

        self.audit.record(ctx, "contract.cancelled", "contract", &contract.id).await;
        Ok(contract)
    }

    pub async fn get_contract(&self, ctx: &AuthContext, id: &str) -> Result<ContractDoc> {
        get_scoped(self.stores.contracts.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_contracts(
        &self,
        ctx: &AuthContext,
        status: Option<ContractStatus>,
    ) -> Result<Vec<ContractDoc>> {
        let mut filter = doc! { "org_id": &ctx.org_id };
        if let Some(status) = status {
            filter.insert("status", status);
        }
        self.stores.contracts.find_many(filter).await
    }

    // =========================================================================
    // Handoff
    // =========================================================================

    /// Hand a signed contract to delivery and raise its finance document:
    /// a draft billing (revenue) or a pending payable (procurement).
    pub async fn create_handoff(
        &self,
        ctx: &AuthContext,
        req: CreateHandoffRequest,
    ) -> Result<HandoffDoc> {
        let owner = ensure_member(&self.stores, &ctx.org_id, &req.owner_id).await?;

        let handoff_id = uuid::Uuid::new_v4().to_string();
        let contract = modify_scoped(
            self.stores.contracts.as_ref(),
            &ctx.org_id,
            &req.contract_id,
            |c| {
                if c.status != ContractStatus::Signed {
                    return Err(IbError::Conflict(format!(
                        "Contract is {}; only signed contracts can be handed off",
                        c.status
                    )));
                }
                if c.handoff_id.is_some() {
                    return Err(IbError::Conflict("Contract already has a handoff".into()));
                }
                c.handoff_id = Some(handoff_id.clone());
                Ok(())
            },
        )
        .await?;

        let source = SourceRef::new("handoff", &handoff_id);
        let (billing_id, payable_id) = match contract.kind {
            DealKind::Revenue => {
                let due_date = Utc::now()
                    .date_naive()
                    .checked_add_days(Days::new(HANDOFF_BILLING_DUE_DAYS))
                    .unwrap_or(contract.end_date);
                let billing = self
                    .finance
                    .create_billing(
                        ctx,
                        CreateBillingRequest {
                            customer_name: contract.counterparty.clone(),
                            customer_email: None,
                            currency: contract.currency.clone(),
                            due_date,
                            lines: contract
                                .line_items
                                .iter()
                                .map(|l| BillingLineInput {
                                    description: l.description.clone(),
                                    quantity: l.quantity,
                                    unit_price: l.unit_price,
                                    tax_rate: Decimal::ZERO,
                                })
                                .collect(),
                            source: Some(source),
                        },
                    )
                    .await?;
                (Some(billing.id), None)
            }
            DealKind::Procurement => {
                let payable = self
                    .finance
                    .create_payable(
                        ctx,
                        CreatePayableRequest {
                            vendor_name: contract.counterparty.clone(),
                            currency: contract.currency.clone(),
                            due_date: contract.end_date,
                            amount: contract.total_value,
                            source: Some(source),
                        },
                    )
                    .await?;
                (None, Some(payable.id))
            }
        };

        let handoff = HandoffDoc {
            id: handoff_id,
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            kind: contract.kind,
            contract_id: contract.id.clone(),
            commit_id: contract.commit_id.clone(),
            owner_id: owner.id,
            notes: req.notes.filter(|n| !n.trim().is_empty()),
            status: HandoffStatus::Pending,
            billing_id,
            payable_id,
            created_by: ctx.user_id.clone(),
            accepted_at: None,
            completed_at: None,
        };

        let handoff = self.stores.handoffs.insert(handoff).await?;
        info!(handoff_id = %handoff.id, contract_id = %handoff.contract_id, "Handoff created");
        self.audit.record(ctx, "handoff.created", "handoff", &handoff.id).await;
        Ok(handoff)
    }

    fn ensure_handoff_actor(ctx: &AuthContext, handoff: &HandoffDoc) -> Result<()> {
        if handoff.owner_id == ctx.user_id || matches!(ctx.role, Role::OrgAdmin | Role::SuperAdmin) {
            Ok(())
        } else {
            Err(IbError::Forbidden(
                "Only the handoff owner or an org admin can do this".into(),
            ))
        }
    }

    pub async fn accept_handoff(&self, ctx: &AuthContext, id: &str) -> Result<HandoffDoc> {
        let handoff = modify_scoped(self.stores.handoffs.as_ref(), &ctx.org_id, id, |h| {
            Self::ensure_handoff_actor(ctx, h)?;
            if h.status != HandoffStatus::Pending {
                return Err(IbError::Conflict(format!("Handoff is already {}", h.status)));
            }
            h.status = HandoffStatus::Accepted;
            h.accepted_at = Some(Utc::now());
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "handoff.accepted", "handoff", &handoff.id).await;
        Ok(handoff)
    }

    pub async fn complete_handoff(&self, ctx: &AuthContext, id: &str) -> Result<HandoffDoc> {
        let handoff = modify_scoped(self.stores.handoffs.as_ref(), &ctx.org_id, id, |h| {
            Self::ensure_handoff_actor(ctx, h)?;
            if h.status != HandoffStatus::Accepted {
                return Err(IbError::Conflict(format!(
                    "Only accepted handoffs can be completed (handoff is {})",
                    h.status
                )));
            }
            h.status = HandoffStatus::Completed;
            h.completed_at = Some(Utc::now());
            Ok(())
        })
        .await?;

        self.audit.record(ctx, "handoff.completed", "handoff", &handoff.id).await;
        Ok(handoff)
    }

    pub async fn get_handoff(&self, ctx: &AuthContext, id: &str) -> Result<HandoffDoc> {
        get_scoped(self.stores.handoffs.as_ref(), &ctx.org_id, id).await
    }

    pub async fn list_handoffs(
        &self,
        ctx: &AuthContext,
        status: Option<HandoffStatus>,
    ) -> Result<Vec<HandoffDoc>> {
        let mut filter = doc! { "org_id": &ctx.org_id };
        if let Some(status) = status {
            filter.insert("status", status);
        }
        self.stores.handoffs.find_many(filter).await
    }

    pub async fn pipeline_summary(&self, ctx: &AuthContext) -> Result<PipelineSummary> {
        let scope = doc! { "org_id": &ctx.org_id };
        let leads = self.stores.leads.find_many(scope.clone()).await?;
        let evaluations = self.stores.evaluations.find_many(scope.clone()).await?;
        let commits = self.stores.commits.find_many(scope.clone()).await?;
        let contracts = self.stores.contracts.find_many(scope.clone()).await?;
        let handoffs = self.stores.handoffs.find_many(scope).await?;

        Ok(PipelineSummary {
            leads_by_stage: tally(&leads, |l| l.stage.as_str()),
            leads_by_status: tally(&leads, |l| l.status.as_str()),
            evaluations: tally(&evaluations, |e| e.status.as_str()),
            commits: tally(&commits, |c| c.status.as_str()),
            contracts: tally(&contracts, |c| c.status.as_str()),
            handoffs: tally(&handoffs, |h| h.status.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::leads::{CreateLeadRequest, LeadService};
    use crate::db::repository::racing::RacingRepository;
    use crate::db::schemas::{BillingStatus, LeadStage, PayableStatus, UserDoc};
    use crate::db::Repository;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct Fixture {
        stores: Stores,
        deals: DealService,
        finance: FinanceService,
        org: String,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_stores(Stores::memory())
        }

        fn with_stores(stores: Stores) -> Self {
            let audit = AuditLogger::new();
            let finance = FinanceService::new(stores.clone(), audit.clone());
            let deals = DealService::new(
                stores.clone(),
                audit,
                ApprovalPolicy::default(),
                finance.clone(),
            );
            Self {
                stores,
                deals,
                finance,
                org: "org-1".into(),
            }
        }

        async fn user(&self, role: Role) -> AuthContext {
            let email = format!("{}@acme.io", role.as_str());
            let user = self
                .stores
                .users
                .insert(UserDoc::new(&self.org, &email, role.as_str(), String::new(), role))
                .await
                .unwrap();
            AuthContext::from_user(&user)
        }

        /// A lead that already went through the SOP
        async fn converted_lead(&self, ctx: &AuthContext) -> String {
            let leads = LeadService::new(self.stores.clone(), AuditLogger::new());
            let lead = leads
                .create_lead(
                    ctx,
                    CreateLeadRequest {
                        company_name: "Globex".into(),
                        contact_name: None,
                        email: Some("buy@globex.io".into()),
                        phone: None,
                        country: None,
                        industry: None,
                        source: None,
                        estimated_value: None,
                        employee_count: None,
                        notes: None,
                        force: false,
                    },
                )
                .await
                .unwrap();
            let mut stored = leads.get_lead(ctx, &lead.id).await.unwrap();
            stored.stage = LeadStage::Convert;
            stored.status = LeadStatus::Converted;
            self.stores.leads.update(stored).await.unwrap();
            lead.id
        }
    }

    fn line(qty: Decimal, price: Decimal, cost: Decimal) -> DealLine {
        DealLine {
            description: "Widgets".into(),
            quantity: qty,
            unit_price: price,
            unit_cost: cost,
        }
    }

    fn risk(score: Decimal, weight: Decimal) -> RiskFactor {
        RiskFactor {
            name: "credit".into(),
            score,
            weight,
        }
    }

    fn approve() -> DecisionRequest {
        DecisionRequest {
            decision: Decision::Approve,
            comment: None,
        }
    }

    #[test]
    fn test_figures() {
        let figures = compute_figures(
            &[line(dec!(10), dec!(100), dec!(70)), line(dec!(1), dec!(500), dec!(500))],
            &[risk(dec!(80), dec!(3)), risk(dec!(20), dec!(1))],
        );
        assert_eq!(figures.total_value, dec!(1500));
        assert_eq!(figures.total_cost, dec!(1200));
        assert_eq!(figures.gross_margin_percent, dec!(20));
        assert_eq!(figures.risk_score, dec!(65));

        let empty = compute_figures(&[], &[]);
        assert_eq!(empty.gross_margin_percent, Decimal::ZERO);
        assert_eq!(empty.risk_score, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_revenue_needs_converted_lead() {
        let fx = Fixture::new();
        let sales = fx.user(Role::Sales).await;
        let req = CreateEvaluationRequest {
            kind: DealKind::Revenue,
            lead_id: None,
            counterparty: Some("Globex".into()),
            currency: "USD".into(),
            line_items: vec![line(dec!(1), dec!(10), dec!(5))],
            risk_factors: vec![],
            notes: None,
        };
        assert!(matches!(
            fx.deals.create_evaluation(&sales, req.clone()).await,
            Err(IbError::Validation(_))
        ));

        let lead_id = fx.converted_lead(&sales).await;
        let evaluation = fx
            .deals
            .create_evaluation(&sales, CreateEvaluationRequest { lead_id: Some(lead_id), counterparty: None, ..req })
            .await
            .unwrap();
        assert_eq!(evaluation.counterparty, "Globex");
    }

    #[tokio::test]
    async fn test_submit_requires_lines_and_freezes_draft() {
        let fx = Fixture::new();
        let buyer = fx.user(Role::Procurement).await;
        let evaluation = fx
            .deals
            .create_evaluation(
                &buyer,
                CreateEvaluationRequest {
                    kind: DealKind::Procurement,
                    lead_id: None,
                    counterparty: Some("Steel Co".into()),
                    currency: "usd".into(),
                    line_items: vec![],
                    risk_factors: vec![],
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            fx.deals.submit_evaluation(&buyer, &evaluation.id).await,
            Err(IbError::Validation(_))
        ));

        let updated = fx
            .deals
            .update_evaluation(
                &buyer,
                &evaluation.id,
                UpdateEvaluationRequest {
                    line_items: Some(vec![line(dec!(2), dec!(50), dec!(0))]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.figures.total_value, dec!(100));

        fx.deals.submit_evaluation(&buyer, &evaluation.id).await.unwrap();
        assert!(fx
            .deals
            .update_evaluation(&buyer, &evaluation.id, UpdateEvaluationRequest::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_commit_waits_for_every_role() {
        let fx = Fixture::new();
        let sales = fx.user(Role::Sales).await;
        let manager = fx.user(Role::SalesManager).await;
        let legal = fx.user(Role::Legal).await;
        let finance = fx.user(Role::FinanceHead).await;

        let lead_id = fx.converted_lead(&sales).await;
        // value 150k, margin 15%, risk 65 -> manager, legal, finance head
        let evaluation = fx
            .deals
            .create_evaluation(
                &sales,
                CreateEvaluationRequest {
                    kind: DealKind::Revenue,
                    lead_id: Some(lead_id),
                    counterparty: None,
                    currency: "USD".into(),
                    line_items: vec![line(dec!(100), dec!(1500), dec!(1275))],
                    risk_factors: vec![risk(dec!(65), dec!(1))],
                    notes: None,
                },
            )
            .await
            .unwrap();

        // not submitted yet
        assert!(fx
            .deals
            .create_commit(&sales, CreateCommitRequest { evaluation_id: evaluation.id.clone() })
            .await
            .is_err());
        fx.deals.submit_evaluation(&sales, &evaluation.id).await.unwrap();

        let commit = fx
            .deals
            .create_commit(&sales, CreateCommitRequest { evaluation_id: evaluation.id.clone() })
            .await
            .unwrap();
        assert_eq!(
            commit.required_roles,
            vec![Role::SalesManager, Role::Legal, Role::FinanceHead]
        );
        assert_eq!(commit.status, CommitStatus::PendingApproval);

        // single commit per evaluation
        assert!(fx
            .deals
            .create_commit(&sales, CreateCommitRequest { evaluation_id: evaluation.id.clone() })
            .await
            .is_err());

        // unlisted role
        assert!(matches!(
            fx.deals.decide_commit(&sales, &commit.id, approve()).await,
            Err(IbError::Forbidden(_))
        ));

        let c = fx.deals.decide_commit(&manager, &commit.id, approve()).await.unwrap();
        assert_eq!(c.status, CommitStatus::PendingApproval);
        assert!(matches!(
            fx.deals.decide_commit(&manager, &commit.id, approve()).await,
            Err(IbError::Conflict(_))
        ));

        // no contract before full approval
        let contract_req = CreateContractRequest {
            commit_id: commit.id.clone(),
            title: "MSA".into(),
            terms: "Net 30".into(),
            start_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap(),
        };
        assert!(fx.deals.create_contract(&sales, contract_req.clone()).await.is_err());

        fx.deals.decide_commit(&legal, &commit.id, approve()).await.unwrap();
        let c = fx.deals.decide_commit(&finance, &commit.id, approve()).await.unwrap();
        assert_eq!(c.status, CommitStatus::Approved);
        assert!(c.decided_at.is_some());

        assert!(fx.deals.create_contract(&sales, contract_req).await.is_ok());
    }

    #[tokio::test]
    async fn test_reject_is_final() {
        let fx = Fixture::new();
        let buyer = fx.user(Role::Procurement).await;
        let manager = fx.user(Role::ProcurementManager).await;

        let evaluation = fx
            .deals
            .create_evaluation(
                &buyer,
                CreateEvaluationRequest {
                    kind: DealKind::Procurement,
                    lead_id: None,
                    counterparty: Some("Steel Co".into()),
                    currency: "EUR".into(),
                    line_items: vec![line(dec!(1), dec!(1000), dec!(0))],
                    risk_factors: vec![],
                    notes: None,
                },
            )
            .await
            .unwrap();
        fx.deals.submit_evaluation(&buyer, &evaluation.id).await.unwrap();
        let commit = fx
            .deals
            .create_commit(&buyer, CreateCommitRequest { evaluation_id: evaluation.id })
            .await
            .unwrap();
        assert_eq!(commit.required_roles, vec![Role::ProcurementManager]);

        let rejected = fx
            .deals
            .decide_commit(
                &manager,
                &commit.id,
                DecisionRequest {
                    decision: Decision::Reject,
                    comment: Some("too pricey".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, CommitStatus::Rejected);
        assert!(fx.deals.decide_commit(&manager, &commit.id, approve()).await.is_err());
    }

    #[tokio::test]
    async fn test_stale_commit_write_is_rejected() {
        let fx = Fixture::new();
        let buyer = fx.user(Role::Procurement).await;
        let manager = fx.user(Role::ProcurementManager).await;
        let evaluation = fx
            .deals
            .create_evaluation(
                &buyer,
                CreateEvaluationRequest {
                    kind: DealKind::Procurement,
                    lead_id: None,
                    counterparty: Some("Steel Co".into()),
                    currency: "EUR".into(),
                    line_items: vec![line(dec!(1), dec!(10), dec!(0))],
                    risk_factors: vec![],
                    notes: None,
                },
            )
            .await
            .unwrap();
        fx.deals.submit_evaluation(&buyer, &evaluation.id).await.unwrap();
        let commit = fx
            .deals
            .create_commit(&buyer, CreateCommitRequest { evaluation_id: evaluation.id })
            .await
            .unwrap();

        let stale = fx.deals.get_commit(&buyer, &commit.id).await.unwrap();
        fx.deals.decide_commit(&manager, &commit.id, approve()).await.unwrap();

        let mut forged = stale;
        forged.status = CommitStatus::Rejected;
        assert!(matches!(
            fx.stores.commits.update(forged).await,
            Err(IbError::VersionConflict(_))
        ));
        assert_eq!(
            fx.deals.get_commit(&buyer, &commit.id).await.unwrap().status,
            CommitStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_lost_decision_race_rechecks_role() {
        let mut stores = Stores::memory();
        let racing = Arc::new(RacingRepository::new(stores.commits.clone()));
        stores.commits = racing.clone() as Arc<dyn Repository<CommitDoc>>;
        let fx = Fixture::with_stores(stores);
        let buyer = fx.user(Role::Procurement).await;
        let manager = fx.user(Role::ProcurementManager).await;

        let evaluation = fx
            .deals
            .create_evaluation(
                &buyer,
                CreateEvaluationRequest {
                    kind: DealKind::Procurement,
                    lead_id: None,
                    counterparty: Some("Steel Co".into()),
                    currency: "EUR".into(),
                    line_items: vec![line(dec!(1), dec!(150000), dec!(0))],
                    risk_factors: vec![],
                    notes: None,
                },
            )
            .await
            .unwrap();
        fx.deals.submit_evaluation(&buyer, &evaluation.id).await.unwrap();
        let commit = fx
            .deals
            .create_commit(&buyer, CreateCommitRequest { evaluation_id: evaluation.id })
            .await
            .unwrap();
        assert_eq!(commit.required_roles, vec![Role::ProcurementManager, Role::FinanceHead]);

        // Another procurement manager's approval lands first
        racing.race_next_update(|commit: &mut CommitDoc| {
            commit.decisions.push(ApprovalDecision {
                role: Role::ProcurementManager,
                user_id: "other-manager".into(),
                decision: Decision::Approve,
                comment: None,
                decided_at: Utc::now(),
            });
        });

        let err = fx
            .deals
            .decide_commit(
                &manager,
                &commit.id,
                DecisionRequest {
                    decision: Decision::Reject,
                    comment: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IbError::Conflict(_)));

        let stored = fx.deals.get_commit(&buyer, &commit.id).await.unwrap();
        assert_eq!(stored.status, CommitStatus::PendingApproval);
        assert_eq!(stored.decisions.len(), 1);
        assert_eq!(stored.decisions[0].user_id, "other-manager");
    }

    async fn signed_contract(fx: &Fixture, kind: DealKind) -> (ContractDoc, AuthContext) {
        let rep = fx.user(Role::OrgAdmin).await;
        let approver = fx
            .user(match kind {
                DealKind::Revenue => Role::SalesManager,
                DealKind::Procurement => Role::ProcurementManager,
            })
            .await;
        let lead_id = match kind {
            DealKind::Revenue => Some(fx.converted_lead(&rep).await),
            DealKind::Procurement => None,
        };

        let evaluation = fx
            .deals
            .create_evaluation(
                &rep,
                CreateEvaluationRequest {
                    kind,
                    lead_id,
                    counterparty: Some("Counterparty".into()),
                    currency: "USD".into(),
                    line_items: vec![line(dec!(4), dec!(250), dec!(100))],
                    risk_factors: vec![],
                    notes: None,
                },
            )
            .await
            .unwrap();
        fx.deals.submit_evaluation(&rep, &evaluation.id).await.unwrap();
        let commit = fx
            .deals
            .create_commit(&rep, CreateCommitRequest { evaluation_id: evaluation.id })
            .await
            .unwrap();
        fx.deals.decide_commit(&approver, &commit.id, approve()).await.unwrap();

        let contract = fx
            .deals
            .create_contract(
                &rep,
                CreateContractRequest {
                    commit_id: commit.id,
                    title: "Supply".into(),
                    terms: String::new(),
                    start_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2030, 6, 30).unwrap(),
                },
            )
            .await
            .unwrap();

        // cannot sign a draft
        assert!(fx
            .deals
            .sign_contract(&rep, &contract.id, SignContractRequest { signed_by: "CFO".into() })
            .await
            .is_err());
        fx.deals.send_contract(&rep, &contract.id).await.unwrap();
        let signed = fx
            .deals
            .sign_contract(&rep, &contract.id, SignContractRequest { signed_by: "CFO".into() })
            .await
            .unwrap();
        assert!(fx.deals.cancel_contract(&rep, &contract.id).await.is_err());
        (signed, rep)
    }

    #[tokio::test]
    async fn test_revenue_handoff_raises_draft_billing() {
        let fx = Fixture::new();
        let (contract, admin) = signed_contract(&fx, DealKind::Revenue).await;
        let owner = fx.user(Role::Member).await;

        let handoff = fx
            .deals
            .create_handoff(
                &admin,
                CreateHandoffRequest {
                    contract_id: contract.id.clone(),
                    owner_id: owner.user_id.clone(),
                    notes: None,
                },
            )
            .await
            .unwrap();
        let billing = fx
            .finance
            .get_billing(&admin, handoff.billing_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(billing.status, BillingStatus::Draft);
        assert_eq!(billing.total, dec!(1000));
        assert_eq!(billing.source, Some(SourceRef::new("handoff", &handoff.id)));

        // one handoff per contract
        assert!(fx
            .deals
            .create_handoff(
                &admin,
                CreateHandoffRequest {
                    contract_id: contract.id,
                    owner_id: owner.user_id.clone(),
                    notes: None,
                },
            )
            .await
            .is_err());

        // strangers cannot accept; owner can
        let stranger = fx.user(Role::Sales).await;
        assert!(matches!(
            fx.deals.accept_handoff(&stranger, &handoff.id).await,
            Err(IbError::Forbidden(_))
        ));
        assert!(fx.deals.complete_handoff(&owner, &handoff.id).await.is_err());
        fx.deals.accept_handoff(&owner, &handoff.id).await.unwrap();
        let done = fx.deals.complete_handoff(&owner, &handoff.id).await.unwrap();
        assert_eq!(done.status, HandoffStatus::Completed);

        let summary = fx.deals.pipeline_summary(&admin).await.unwrap();
        assert_eq!(summary.handoffs.get("completed"), Some(&1));
        assert_eq!(summary.contracts.get("signed"), Some(&1));
        assert_eq!(summary.leads_by_status.get("converted"), Some(&1));
    }

    #[tokio::test]
    async fn test_procurement_handoff_raises_payable() {
        let fx = Fixture::new();
        let (contract, admin) = signed_contract(&fx, DealKind::Procurement).await;

        let handoff = fx
            .deals
            .create_handoff(
                &admin,
                CreateHandoffRequest {
                    contract_id: contract.id,
                    owner_id: admin.user_id.clone(),
                    notes: Some("Dock 4".into()),
                },
            )
            .await
            .unwrap();
        assert!(handoff.billing_id.is_none());
        let payable = fx
            .finance
            .get_payable(&admin, handoff.payable_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(payable.status, PayableStatus::Pending);
        assert_eq!(payable.amount, dec!(1000));
    }
}

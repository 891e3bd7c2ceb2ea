//! IB Commerce: the lead SOP and the deal workflow

pub mod approval_matrix;
pub mod deals;
pub mod dedupe;
pub mod leads;
pub mod scoring;
pub mod sop;

pub use approval_matrix::ApprovalPolicy;
pub use deals::{
    compute_figures, CreateCommitRequest, CreateContractRequest, CreateEvaluationRequest,
    CreateHandoffRequest, DealService, DecisionRequest, PipelineSummary, SignContractRequest,
    UpdateEvaluationRequest,
};
pub use leads::{
    AdvanceLeadRequest, AssignLeadRequest, CreateLeadRequest, DisqualifyLeadRequest,
    EnrichLeadRequest, LeadFilter, LeadService, LogActivityRequest,
};

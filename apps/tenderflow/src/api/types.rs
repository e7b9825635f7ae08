//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use serde::{Deserialize, Serialize};
use tenderflow_core::{
    AuditEntry, AwardRequest, FinalizeRequest, StageDefinition, StageId, Tender, TenderId,
    TenderflowError, primitives::TOTAL_STAGES,
};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body of every failed request outside the two stage endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn from_error(error: &TenderflowError) -> Self {
        Self::new(error.to_string(), error.kind().as_str())
    }
}

// =============================================================================
// FINALIZE / AWARD
// =============================================================================

/// `POST /finalizeStage` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeStageRequest {
    #[serde(default)]
    pub tender_id: String,
    #[serde(default)]
    pub stage_id: String,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FinalizeStageRequest {
    /// Convert to the engine request, validating identifiers and payload bounds.
    pub fn into_request(self) -> Result<FinalizeRequest, TenderflowError> {
        FinalizeRequest::parse(
            &self.tender_id,
            &self.stage_id,
            self.evidence_refs,
            self.notes,
        )
    }
}

/// `POST /awardTender` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardTenderRequest {
    #[serde(default)]
    pub tender_id: String,
    #[serde(default)]
    pub loa_ref: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AwardTenderRequest {
    pub fn into_request(self) -> Result<AwardRequest, TenderflowError> {
        AwardRequest::parse(&self.tender_id, &self.loa_ref, self.notes)
    }
}

/// Discriminated result of finalize and award.
///
/// On success `tender` and `message` are set; on failure `error` and `code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tender: Option<Tender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl StageResponse {
    pub fn completed(tender: Tender, message: impl Into<String>) -> Self {
        Self {
            success: true,
            tender: Some(tender),
            message: Some(message.into()),
            error: None,
            code: None,
        }
    }

    pub fn failure(error: &TenderflowError) -> Self {
        Self {
            success: false,
            tender: None,
            message: None,
            error: Some(error.to_string()),
            code: Some(error.kind().as_str().to_string()),
        }
    }
}

// =============================================================================
// TENDERS
// =============================================================================

/// A single tender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderResponse {
    pub success: bool,
    pub tender: Tender,
}

impl TenderResponse {
    pub fn found(tender: Tender) -> Self {
        Self {
            success: true,
            tender,
        }
    }
}

/// `GET /tenders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderListResponse {
    pub total: usize,
    pub tenders: Vec<Tender>,
}

/// `GET /tenders/{id}/audit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub tender_id: TenderId,
    pub entries: Vec<AuditEntry>,
}

/// `POST /tenders/{id}/auto-advance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceResponse {
    pub success: bool,
    pub completed: Vec<StageId>,
    pub tender: Tender,
}

// =============================================================================
// STAGES
// =============================================================================

/// `GET /stages`: the registry in order.
#[derive(Debug, Clone, Serialize)]
pub struct StagesResponse {
    pub total: usize,
    pub stages: Vec<&'static StageDefinition>,
}

impl Default for StagesResponse {
    fn default() -> Self {
        Self {
            total: TOTAL_STAGES,
            stages: tenderflow_core::system::stage_definitions().collect(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

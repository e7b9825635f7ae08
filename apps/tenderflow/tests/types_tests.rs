//! Unit tests for API types serialization/deserialization.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use serde_json::{Value, json};
use tenderflow::api::{
    AdvanceResponse, AuditResponse, AwardTenderRequest, ErrorResponse, FinalizeStageRequest,
    HealthResponse, StageResponse, StagesResponse, TenderListResponse,
};
use tenderflow_core::{
    AuditEntry, ErrorKind, StageId, Tender, TenderId, TenderflowError, Timestamp, UserId,
};

fn sample_tender() -> Tender {
    Tender::new(TenderId::new("TND-000007"), "Storm drain")
}

// =============================================================================
// HEALTH RESPONSE TESTS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_health_response_deserialization() {
    let json = r#"{"status":"healthy","version":"1.0.0"}"#;
    let health: HealthResponse = serde_json::from_str(json).unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, "1.0.0");
}

// =============================================================================
// ERROR RESPONSE TESTS
// =============================================================================

#[test]
fn test_error_response_from_error() {
    let error = TenderflowError::TenderNotFound(TenderId::new("TND-000404"));
    let body = ErrorResponse::from_error(&error);

    assert!(!body.success);
    assert_eq!(body.code, "not-found");
    assert!(body.error.contains("TND-000404"));
}

#[test]
fn test_error_response_serialization() {
    let body = ErrorResponse::new("Too Many Requests", "rate-limited");
    let value = serde_json::to_value(&body).unwrap();

    assert_eq!(
        value,
        json!({ "success": false, "error": "Too Many Requests", "code": "rate-limited" })
    );
}

// =============================================================================
// FINALIZE REQUEST TESTS
// =============================================================================

#[test]
fn test_finalize_request_camel_case() {
    let json = r#"{
        "tenderId": "TND-000001",
        "stageId": "4_sitevisit",
        "evidenceRefs": ["site/photos.zip"],
        "notes": "visited with the client"
    }"#;
    let body: FinalizeStageRequest = serde_json::from_str(json).unwrap();

    let request = body.into_request().unwrap();
    assert_eq!(request.tender_id.as_str(), "TND-000001");
    assert_eq!(request.stage, StageId::SiteVisit);
    assert_eq!(request.evidence_refs, vec!["site/photos.zip".to_string()]);
    assert_eq!(request.notes.as_deref(), Some("visited with the client"));
}

#[test]
fn test_finalize_request_defaults() {
    let body: FinalizeStageRequest =
        serde_json::from_str(r#"{"tenderId":"TND-000001","stageId":"5_technical"}"#).unwrap();

    assert!(body.evidence_refs.is_empty());
    assert!(body.notes.is_none());
    assert!(body.into_request().is_ok());
}

#[test]
fn test_finalize_request_missing_stage() {
    let body: FinalizeStageRequest = serde_json::from_str(r#"{"tenderId":"TND-1"}"#).unwrap();

    let err = body.into_request().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_finalize_request_unknown_stage() {
    let body: FinalizeStageRequest =
        serde_json::from_str(r#"{"tenderId":"TND-1","stageId":"stage_5_technical"}"#).unwrap();

    let err = body.into_request().unwrap_err();
    assert_eq!(err, TenderflowError::UnknownStage("stage_5_technical".into()));
}

#[test]
fn test_award_request_requires_loa_ref() {
    let body: AwardTenderRequest = serde_json::from_str(r#"{"tenderId":"TND-1"}"#).unwrap();

    let err = body.into_request().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

// =============================================================================
// STAGE RESPONSE TESTS
// =============================================================================

#[test]
fn test_stage_response_success_omits_error_fields() {
    let response = StageResponse::completed(sample_tender(), "Site visit completed");
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["success"], true);
    assert_eq!(value["message"], "Site visit completed");
    assert_eq!(value["tender"]["tenderId"], "TND-000007");
    assert!(value.get("error").is_none());
    assert!(value.get("code").is_none());
}

#[test]
fn test_stage_response_failure_omits_tender() {
    let error = TenderflowError::AlreadyCompleted(StageId::Technical);
    let value = serde_json::to_value(StageResponse::failure(&error)).unwrap();

    assert_eq!(value["success"], false);
    assert_eq!(value["code"], "already-completed");
    assert!(value["error"].as_str().unwrap().contains("5_technical"));
    assert!(value.get("tender").is_none());
    assert!(value.get("message").is_none());
}

#[test]
fn test_stage_response_deserialization() {
    let json = r#"{"success":false,"error":"Only admins can award tenders","code":"forbidden"}"#;
    let response: StageResponse = serde_json::from_str(json).unwrap();

    assert!(!response.success);
    assert!(response.tender.is_none());
    assert_eq!(response.code.as_deref(), Some("forbidden"));
}

// =============================================================================
// LIST / AUDIT / ADVANCE TESTS
// =============================================================================

#[test]
fn test_tender_list_response_serialization() {
    let list = TenderListResponse {
        total: 1,
        tenders: vec![sample_tender()],
    };
    let value = serde_json::to_value(&list).unwrap();

    assert_eq!(value["total"], 1);
    assert_eq!(value["tenders"][0]["title"], "Storm drain");
    assert_eq!(value["tenders"][0]["progressPercent"], 0);
}

#[test]
fn test_audit_response_camel_case() {
    let entry = AuditEntry::new(
        TenderId::new("TND-000007"),
        "STAGE_6_BOQ_COMPLETED",
        UserId::new("system"),
        Timestamp::from_millis(1_700_000_000_000),
    )
    .with("stageId", "6_boq");
    let response = AuditResponse {
        tender_id: TenderId::new("TND-000007"),
        entries: vec![entry],
    };
    let value: Value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["tenderId"], "TND-000007");
    assert_eq!(value["entries"][0]["performedBy"], "system");
    assert_eq!(value["entries"][0]["timestamp"], 1_700_000_000_000u64);
    assert_eq!(value["entries"][0]["metadata"]["stageId"], "6_boq");
}

#[test]
fn test_advance_response_lists_stage_ids() {
    let response = AdvanceResponse {
        success: true,
        completed: vec![StageId::Documents, StageId::Approvals],
        tender: sample_tender(),
    };
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["completed"], json!(["2_documents", "9_approvals"]));
}

// =============================================================================
// STAGES RESPONSE TESTS
// =============================================================================

#[test]
fn test_stages_response_default() {
    let stages = StagesResponse::default();
    assert_eq!(stages.total, 16);
    assert_eq!(stages.stages.len(), 16);
    assert_eq!(stages.stages[0].id, StageId::Identification);
    assert_eq!(stages.stages[15].id, StageId::Loa);
}

#[test]
fn test_stages_response_serialization() {
    let value = serde_json::to_value(StagesResponse::default()).unwrap();
    let hybrid = &value["stages"][6];

    assert_eq!(hybrid["id"], "7_costing");
    assert_eq!(hybrid["number"], 7);
    assert_eq!(hybrid["triggerType"], "hybrid");
    assert_eq!(hybrid["requiredRoles"], json!(["admin", "tender_manager"]));
}

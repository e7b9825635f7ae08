//! # API Endpoint Handlers
//!
//! Every handler reads the clock once, takes the workflow lock, and maps
//! engine errors onto HTTP statuses through [`status_for`].

use super::{
    AppState,
    auth::MaybeCaller,
    types::{
        AdvanceResponse, AuditResponse, AwardTenderRequest, ErrorResponse, FinalizeStageRequest,
        HealthResponse, StageResponse, StagesResponse, TenderListResponse, TenderResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tenderflow_core::{ErrorKind, NewTender, StageId, TenderId, TenderflowError, Timestamp};

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// HTTP status for an error category.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyCompleted => StatusCode::CONFLICT,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn log_failure(operation: &'static str, error: &TenderflowError) {
    if error.kind() == ErrorKind::Internal {
        tracing::error!(event = operation, code = error.kind().as_str(), "{}", error);
    } else {
        tracing::debug!(event = operation, code = error.kind().as_str(), "{}", error);
    }
}

fn error_response(operation: &'static str, error: &TenderflowError) -> Response {
    log_failure(operation, error);
    (
        status_for(error.kind()),
        Json(ErrorResponse::from_error(error)),
    )
        .into_response()
}

fn stage_failure(operation: &'static str, error: &TenderflowError) -> Response {
    log_failure(operation, error);
    (
        status_for(error.kind()),
        Json(StageResponse::failure(error)),
    )
        .into_response()
}

fn malformed_body(rejection: &JsonRejection) -> TenderflowError {
    TenderflowError::InvalidArgument(rejection.body_text())
}

// =============================================================================
// HEALTH / REGISTRY
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Stage registry in order.
pub async fn stages_handler() -> impl IntoResponse {
    Json(StagesResponse::default())
}

// =============================================================================
// FINALIZE / AWARD
// =============================================================================

/// `POST /finalizeStage`.
pub async fn finalize_stage_handler(
    State(state): State<AppState>,
    caller: MaybeCaller,
    body: Result<Json<FinalizeStageRequest>, JsonRejection>,
) -> Response {
    let request = match body
        .map_err(|rejection| malformed_body(&rejection))
        .and_then(|Json(body)| body.into_request())
    {
        Ok(request) => request,
        Err(e) => return stage_failure("finalize_stage", &e),
    };

    let now = Timestamp::now();
    let mut workflow = state.workflow.write().await;
    match workflow.finalize_stage(caller.user(), &request, now) {
        Ok(outcome) => {
            tracing::info!(
                event = "stage_finalized",
                tender_id = %outcome.tender.tender_id,
                stage = outcome.stage.as_str(),
                progress = outcome.tender.progress_percent,
                "Stage finalized"
            );
            (
                StatusCode::OK,
                Json(StageResponse::completed(outcome.tender, outcome.message)),
            )
                .into_response()
        }
        Err(e) => stage_failure("finalize_stage", &e),
    }
}

/// `POST /awardTender`.
pub async fn award_tender_handler(
    State(state): State<AppState>,
    caller: MaybeCaller,
    body: Result<Json<AwardTenderRequest>, JsonRejection>,
) -> Response {
    let request = match body
        .map_err(|rejection| malformed_body(&rejection))
        .and_then(|Json(body)| body.into_request())
    {
        Ok(request) => request,
        Err(e) => return stage_failure("award_tender", &e),
    };

    let now = Timestamp::now();
    let mut workflow = state.workflow.write().await;
    match workflow.award_tender(caller.user(), &request, now) {
        Ok(outcome) => {
            tracing::info!(
                event = "tender_awarded",
                tender_id = %outcome.tender.tender_id,
                stage = outcome.stage.as_str(),
                "Tender awarded"
            );
            (
                StatusCode::OK,
                Json(StageResponse::completed(outcome.tender, outcome.message)),
            )
                .into_response()
        }
        Err(e) => stage_failure("award_tender", &e),
    }
}

// =============================================================================
// TENDERS
// =============================================================================

/// `POST /tenders`.
pub async fn create_tender_handler(
    State(state): State<AppState>,
    caller: MaybeCaller,
    body: Result<Json<NewTender>, JsonRejection>,
) -> Response {
    let draft = match body {
        Ok(Json(draft)) => draft,
        Err(rejection) => return error_response("create_tender", &malformed_body(&rejection)),
    };

    let now = Timestamp::now();
    let mut workflow = state.workflow.write().await;
    match workflow.create_tender(caller.user(), draft, now) {
        Ok(tender) => {
            tracing::info!(
                event = "tender_created",
                tender_id = %tender.tender_id,
                stage = StageId::Identification.as_str(),
                "Tender created"
            );
            (StatusCode::CREATED, Json(TenderResponse::found(tender))).into_response()
        }
        Err(e) => error_response("create_tender", &e),
    }
}

/// `GET /tenders`: the tenders the caller is a member of.
pub async fn list_tenders_handler(State(state): State<AppState>, caller: MaybeCaller) -> Response {
    let workflow = state.workflow.read().await;
    match workflow.tenders_for(caller.user()) {
        Ok(tenders) => (
            StatusCode::OK,
            Json(TenderListResponse {
                total: tenders.len(),
                tenders,
            }),
        )
            .into_response(),
        Err(e) => error_response("list_tenders", &e),
    }
}

/// `GET /tenders/{id}`.
pub async fn get_tender_handler(
    State(state): State<AppState>,
    caller: MaybeCaller,
    Path(id): Path<String>,
) -> Response {
    let workflow = state.workflow.read().await;
    match workflow.tender_for(caller.user(), &TenderId::new(id)) {
        Ok(tender) => (StatusCode::OK, Json(TenderResponse::found(tender))).into_response(),
        Err(e) => error_response("get_tender", &e),
    }
}

/// `GET /tenders/{id}/progress`.
pub async fn progress_handler(
    State(state): State<AppState>,
    caller: MaybeCaller,
    Path(id): Path<String>,
) -> Response {
    let tender_id = TenderId::new(id);
    let workflow = state.workflow.read().await;
    match workflow
        .tender_for(caller.user(), &tender_id)
        .and_then(|_| workflow.progress(&tender_id))
    {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(e) => error_response("tender_progress", &e),
    }
}

/// `GET /tenders/{id}/audit`.
pub async fn audit_handler(
    State(state): State<AppState>,
    caller: MaybeCaller,
    Path(id): Path<String>,
) -> Response {
    let tender_id = TenderId::new(id);
    let workflow = state.workflow.read().await;
    match workflow
        .tender_for(caller.user(), &tender_id)
        .and_then(|_| workflow.audit_log(&tender_id))
    {
        Ok(entries) => (StatusCode::OK, Json(AuditResponse { tender_id, entries })).into_response(),
        Err(e) => error_response("tender_audit", &e),
    }
}

/// `POST /tenders/{id}/auto-advance`.
///
/// The caller must be a member and is credited with the completions.
pub async fn auto_advance_handler(
    State(state): State<AppState>,
    caller: MaybeCaller,
    Path(id): Path<String>,
) -> Response {
    let Some(user) = caller.user() else {
        return error_response("auto_advance", &TenderflowError::Unauthenticated);
    };
    let tender_id = TenderId::new(id);
    let now = Timestamp::now();
    let mut workflow = state.workflow.write().await;
    match workflow.auto_advance(&tender_id, Some(user), now) {
        Ok(outcome) => {
            for stage in &outcome.completed {
                tracing::info!(
                    event = "stage_auto_completed",
                    tender_id = %tender_id,
                    stage = stage.as_str(),
                    user = %user,
                    "Stage completed automatically"
                );
            }
            (
                StatusCode::OK,
                Json(AdvanceResponse {
                    success: true,
                    completed: outcome.completed,
                    tender: outcome.tender,
                }),
            )
                .into_response()
        }
        Err(e) => error_response("auto_advance", &e),
    }
}

// =============================================================================
// TESTS
// =============================================================================

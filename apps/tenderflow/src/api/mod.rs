//! # Tenderflow HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `POST /finalizeStage` - Finalize one stage of a tender
//! - `POST /awardTender` - Record the LOA and award a tender (admins)
//! - `GET /stages` - Stage registry
//! - `POST /tenders` - Create a tender
//! - `GET /tenders` - List tenders
//! - `GET /tenders/{id}` - Get a tender
//! - `GET /tenders/{id}/progress` - Progress summary and eligibility
//! - `GET /tenders/{id}/audit` - Audit log
//! - `POST /tenders/{id}/auto-advance` - Complete every eligible auto stage
//! - `GET /health` - Health check
//!
//! `/health` and `/stages` are public. Every `/tenders` route needs a caller,
//! and a single tender is only visible to its members.
//!
//! ## Security Configuration
//!
//! See [`crate::config`]: CORS origins, rate limit and the bearer token table
//! come from the config file with `TENDERFLOW_*` environment overrides.

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{Caller, MaybeCaller, TokenTable, caller_middleware};
pub use handlers::status_for;
pub use middleware::{GlobalRateLimiter, create_rate_limiter, rate_limit_middleware};
pub use types::{
    AdvanceResponse, AuditResponse, AwardTenderRequest, ErrorResponse, FinalizeStageRequest,
    HealthResponse, StageResponse, StagesResponse, TenderListResponse, TenderResponse,
};

use crate::config::{Config, HttpConfig};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tenderflow_core::{TenderflowError, Workflow};
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request bodies above this size are rejected.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// Finalize, award, create and advance take the write lock.
    pub workflow: Arc<RwLock<Workflow>>,
    pub tokens: Arc<TokenTable>,
    pub http: Arc<HttpConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(workflow: Workflow, config: &Config) -> Self {
        Self {
            workflow: Arc::new(RwLock::new(workflow)),
            tokens: Arc::new(TokenTable::new(config.auth.tokens.clone())),
            http: Arc::new(config.http.clone()),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer.
///
/// - `["*"]`: allows all origins
/// - `None`: localhost only
/// - otherwise: the listed origins (falls back to localhost if none parse)
fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    match origins {
        Some([only]) if only == "*" => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
                    Ok(hv) => {
                        tracing::info!("CORS: Allowing origin: {}", origin);
                        Some(hv)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
/// 5. Caller resolution from the bearer token
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(state.http.cors_origins.as_deref());

    let rate_limit = state.http.rate_limit;
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    if state.tokens.is_empty() {
        tracing::warn!(
            "No bearer tokens configured - every request is anonymous and operations \
             that need a caller will answer 401. Configure [[auth.tokens]] or \
             TENDERFLOW_AUTH_TOKENS."
        );
    } else {
        tracing::info!("Bearer authentication enabled for {} token(s)", state.tokens.len());
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/stages", get(handlers::stages_handler))
        .route("/finalizeStage", post(handlers::finalize_stage_handler))
        .route("/awardTender", post(handlers::award_tender_handler))
        .route(
            "/tenders",
            get(handlers::list_tenders_handler).post(handlers::create_tender_handler),
        )
        .route("/tenders/{id}", get(handlers::get_tender_handler))
        .route("/tenders/{id}/progress", get(handlers::progress_handler))
        .route("/tenders/{id}/audit", get(handlers::audit_handler))
        .route(
            "/tenders/{id}/auto-advance",
            post(handlers::auto_advance_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state.tokens),
            caller_middleware,
        ));

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve `state` until Ctrl+C.
///
/// The caller keeps its own clone of `state` and can read the final
/// workflow once this returns.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), TenderflowError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TenderflowError::Storage(format!("Bind failed: {}", e)))?;

    tracing::info!("Tenderflow HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TenderflowError::Storage(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

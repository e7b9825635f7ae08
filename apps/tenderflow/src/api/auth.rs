//! # Authentication Module
//!
//! Bearer-token caller resolution for the Tenderflow HTTP API.
//!
//! ## Configuration
//!
//! Tokens come from `[[auth.tokens]]` in the config file and from
//! `TENDERFLOW_AUTH_TOKENS`. Each token maps to one user id.
//!
//! ## Behaviour
//!
//! - No `Authorization` header: the request proceeds anonymously and engine
//!   operations that need a caller answer `unauthenticated`.
//! - Known token: the user id is attached to the request as a [`Caller`].
//! - Unknown token: 401 before any handler runs.
//!
//! ```text
//! Authorization: Bearer <token>
//! ```

use super::types::ErrorResponse;
use crate::config::TokenEntry;
use axum::{
    Json,
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tenderflow_core::{TenderflowError, UserId};

// =============================================================================
// TOKEN TABLE
// =============================================================================

/// Token to user mapping, compared in constant time.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    entries: Vec<TokenEntry>,
}

impl TokenTable {
    #[must_use]
    pub fn new(entries: Vec<TokenEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|entry| !entry.token.is_empty())
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Resolve a presented token.
    ///
    /// Every entry is compared, so the time taken does not depend on which
    /// entry (if any) matched.
    #[must_use]
    pub fn resolve(&self, presented: &str) -> Option<UserId> {
        let mut found = None;
        for entry in &self.entries {
            if tokens_match(presented.as_bytes(), entry.token.as_bytes()) && found.is_none() {
                found = Some(entry.user.clone());
            }
        }
        found
    }
}

/// Constant-time comparison.
///
/// Both sides are padded to the same length so `ct_eq` always runs over the
/// same number of bytes.
fn tokens_match(provided: &[u8], expected: &[u8]) -> bool {
    let max_len = provided.len().max(expected.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided.len()].copy_from_slice(provided);
    padded_expected[..expected.len()].copy_from_slice(expected);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided.len() == expected.len()
}

// =============================================================================
// CALLER
// =============================================================================

/// Authenticated caller, stored in request extensions by the middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub UserId);

/// Extractor yielding the caller when one was authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeCaller(pub Option<UserId>);

impl MaybeCaller {
    #[must_use]
    pub fn user(&self) -> Option<&UserId> {
        self.0.as_ref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeCaller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<Caller>()
                .map(|caller| caller.0.clone()),
        ))
    }
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// Resolve the bearer token, if any, into a [`Caller`].
pub async fn caller_middleware(
    State(tokens): State<Arc<TokenTable>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default().to_string());

    let Some(header_value) = auth_header else {
        return next.run(request).await;
    };

    let presented = header_value
        .strip_prefix("Bearer ")
        .unwrap_or(header_value.as_str())
        .trim();

    match tokens.resolve(presented) {
        Some(user) => {
            tracing::debug!(event = "auth_success", user = %user, "Caller authenticated");
            request.extensions_mut().insert(Caller(user));
            next.run(request).await
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "unknown_token",
                "Authentication failed: unknown bearer token"
            );
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::from_error(&TenderflowError::Unauthenticated)),
            )
                .into_response()
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

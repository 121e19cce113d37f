// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Call Interceptor Chain
//!
//! Every inbound call passes the same stages, outermost first:
//!
//! ```text
//! request id → log_call → panic containment → validate_call → authenticate_call → handler
//! ```
//!
//! - `log_call` records start and finish of every call, including calls
//!   rejected or crashed further in.
//! - Panic containment turns a panicking stage or handler into a normal
//!   `500 internal` response; the connection and the process survive.
//! - `validate_call` rejects malformed requests with `400 invalid_argument`
//!   before any token work is done, and hands the parsed request to the
//!   handler through request extensions.
//! - `authenticate_call` consults [`AuthRequirements`] and, when required,
//!   attaches the caller's [`AuthenticatedAccount`].

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use tracing::Instrument;

use super::calls;
use super::validate::{secret_id_header, Validate};
use crate::auth::{AuthError, AuthRequirements, AuthenticatedAccount, TokenIssuer};
use crate::error::ApiError;
use crate::models::{
    CreateSecretRequest, Credentials, Empty, SecretIdRequest, UpdateSecretRequest,
};

/// Largest accepted unary request body. Bigger payloads go through
/// `UpdateSecretData`.
pub const MAX_UNARY_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// =============================================================================
// Logging
// =============================================================================

/// Log call start and finish inside a span carrying the call name and id.
pub async fn log_call(request: Request, next: Next) -> Response {
    let call = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let span = tracing::info_span!("call", %call, %request_id);

    async move {
        let started = Instant::now();
        tracing::info!("call started");

        let response = next.run(request).await;

        let status = response.status().as_u16();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if response.status().is_server_error() {
            tracing::error!(status, elapsed_ms, "call failed");
        } else if response.status().is_client_error() {
            tracing::warn!(status, elapsed_ms, "call failed");
        } else {
            tracing::info!(status, elapsed_ms, "call completed");
        }
        response
    }
    .instrument(span)
    .await
}

// =============================================================================
// Recovery
// =============================================================================

/// Response for a call whose handling panicked.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(panic = %detail, "call handler panicked");
    ApiError::internal().into_response()
}

// =============================================================================
// Validation
// =============================================================================

/// Reject structurally invalid calls before authentication.
///
/// Unary calls must be `POST` with a JSON body that parses into the call's
/// request type and passes [`Validate`]; the parsed value is inserted into
/// request extensions. Streamed calls must carry a valid secret id header.
/// Unknown call names pass through untouched.
pub async fn validate_call(request: Request, next: Next) -> Result<Response, ApiError> {
    let call = request.uri().path().to_string();

    if calls::is_streamed(&call) {
        require_post(request.method())?;
        secret_id_header(request.headers())?;
        return Ok(next.run(request).await);
    }
    if !calls::is_unary(&call) {
        return Ok(next.run(request).await);
    }

    require_post(request.method())?;
    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_UNARY_BODY_BYTES)
        .await
        .map_err(|_| ApiError::invalid_argument("request body unreadable or too large"))?;

    match call.as_str() {
        calls::REGISTER_ACCOUNT | calls::LOGIN => {
            parts.extensions.insert(parse::<Credentials>(&bytes)?);
        }
        calls::CREATE_SECRET => {
            parts.extensions.insert(parse::<CreateSecretRequest>(&bytes)?);
        }
        calls::GET_SECRET | calls::DELETE_SECRET => {
            parts.extensions.insert(parse::<SecretIdRequest>(&bytes)?);
        }
        calls::UPDATE_SECRET => {
            parts.extensions.insert(parse::<UpdateSecretRequest>(&bytes)?);
        }
        calls::LIST_SECRETS => {
            if !bytes.is_empty() {
                parse::<Empty>(&bytes)?;
            }
        }
        _ => {}
    }

    Ok(next.run(Request::from_parts(parts, Body::empty())).await)
}

fn require_post(method: &Method) -> Result<(), ApiError> {
    if *method == Method::POST {
        Ok(())
    } else {
        Err(ApiError::invalid_argument("calls must use POST"))
    }
}

fn parse<T: DeserializeOwned + Validate>(bytes: &[u8]) -> Result<T, ApiError> {
    let value: T = serde_json::from_slice(bytes)
        .map_err(|e| ApiError::invalid_argument(format!("malformed request: {e}")))?;
    value.validate().map_err(ApiError::invalid_argument)?;
    Ok(value)
}

// =============================================================================
// Authentication
// =============================================================================

/// Token verifier plus the per-call requirement table.
#[derive(Clone)]
pub struct AuthGate {
    pub tokens: TokenIssuer,
    pub requirements: Arc<AuthRequirements>,
}

impl AuthGate {
    pub fn new(tokens: TokenIssuer, requirements: AuthRequirements) -> Self {
        Self {
            tokens,
            requirements: Arc::new(requirements),
        }
    }
}

/// Attach the caller's identity when the call requires one.
pub async fn authenticate_call(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !gate.requirements.requires_auth(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let claims = bearer_token(request.headers())
        .and_then(|token| gate.tokens.validate(token))
        .inspect_err(|e| tracing::warn!(reason = e.error_code(), "call rejected"))?;

    request
        .extensions_mut()
        .insert(AuthenticatedAccount::from(claims));
    Ok(next.run(request).await)
}

/// Extract the token from `authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::InvalidAuthHeader)?;
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

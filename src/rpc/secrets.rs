// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `vault.v1.SecretService` call handlers.
//!
//! Unary calls receive their already-validated request through extensions.
//! The two streamed calls address their secret through the `x-secret-id`
//! metadata header: `UpdateSecretData` consumes the raw request body as a
//! chunk stream, `GetSecretData` answers with a streamed octet body.

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::{StreamExt, TryStreamExt};

use super::validate::secret_id_header;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::models::{
    CreateSecretRequest, CreateSecretResponse, Empty, ListSecretsResponse, SecretIdRequest,
    SecretView, UpdateSecretDataResponse, UpdateSecretRequest, UpdateSecretResponse,
};
use crate::state::AppState;
use crate::storage::StoreError;

pub async fn create_secret(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Extension(request): Extension<CreateSecretRequest>,
) -> Result<Json<CreateSecretResponse>, ApiError> {
    let id = state
        .secrets
        .create(&state.op_context(), &caller, request)
        .await?;
    Ok(Json(CreateSecretResponse { id }))
}

pub async fn get_secret(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Extension(request): Extension<SecretIdRequest>,
) -> Result<Json<SecretView>, ApiError> {
    let secret = state
        .secrets
        .get(&state.op_context(), &caller, request.id)
        .await?;
    Ok(Json(secret.into()))
}

pub async fn list_secrets(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<ListSecretsResponse>, ApiError> {
    let secrets = state.secrets.list(&state.op_context(), &caller).await?;
    Ok(Json(ListSecretsResponse { secrets }))
}

pub async fn update_secret(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Extension(request): Extension<UpdateSecretRequest>,
) -> Result<Json<UpdateSecretResponse>, ApiError> {
    let applied = state
        .secrets
        .update(&state.op_context(), &caller, request)
        .await?;
    Ok(Json(UpdateSecretResponse { applied }))
}

pub async fn delete_secret(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Extension(request): Extension<SecretIdRequest>,
) -> Result<Json<Empty>, ApiError> {
    state
        .secrets
        .delete(&state.op_context(), &caller, request.id)
        .await?;
    Ok(Json(Empty {}))
}

/// Client-streamed payload upload.
pub async fn update_secret_data(
    State(state): State<AppState>,
    Caller(caller): Caller,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UpdateSecretDataResponse>, ApiError> {
    let id = secret_id_header(&headers)?;
    let chunks = body
        .into_data_stream()
        .map_err(|e| StoreError::Stream(e.to_string()))
        .boxed();

    let bytes_written = state
        .secrets
        .update_data(&state.op_context(), &caller, id, chunks)
        .await?;
    Ok(Json(UpdateSecretDataResponse { id, bytes_written }))
}

/// Server-streamed payload download.
pub async fn get_secret_data(
    State(state): State<AppState>,
    Caller(caller): Caller,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = secret_id_header(&headers)?;
    let chunks = state
        .secrets
        .get_data(&state.op_context(), &caller, id)
        .await?
        .inspect_err(move |e| tracing::error!(secret_id = %id, error = %e, "payload stream aborted"));

    Ok((
        [(CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(chunks),
    )
        .into_response())
}

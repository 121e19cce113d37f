// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `vault.v1.AccountService` call handlers.

use axum::{extract::State, Extension, Json};

use crate::error::ApiError;
use crate::models::{Credentials, TokenResponse};
use crate::state::AppState;

/// `RegisterAccount`: create an account and return its first token.
pub async fn register_account(
    State(state): State<AppState>,
    Extension(credentials): Extension<Credentials>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state
        .accounts
        .register(&state.op_context(), credentials)
        .await?;
    Ok(Json(TokenResponse { token }))
}

/// `Login`: exchange credentials for a token.
pub async fn login(
    State(state): State<AppState>,
    Extension(credentials): Extension<Credentials>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.accounts.login(&state.op_context(), credentials).await?;
    Ok(Json(TokenResponse { token }))
}

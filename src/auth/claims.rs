// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the authenticated caller representation.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;

/// Claims carried by a vault access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Account identifier
    pub uid: Uuid,
    /// Account login at issue time
    pub login: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

/// Identity of the caller, attached to the request once the token checks out.
///
/// Stored in request extensions by type, so no other middleware can collide
/// with or overwrite it through a string key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedAccount {
    pub account_id: Uuid,
    pub login: String,
}

impl From<Claims> for AuthenticatedAccount {
    fn from(claims: Claims) -> Self {
        Self {
            account_id: claims.uid,
            login: claims.login,
        }
    }
}

/// Extractor for the authenticated caller.
///
/// The auth interceptor has already validated the token; this only reads the
/// identity it left behind. A handler reached without one (a call missing
/// from the requirement table) is rejected as unauthenticated.
///
/// ```rust,ignore
/// async fn list_secrets(
///     Caller(caller): Caller,
///     State(state): State<AppState>,
/// ) -> Result<Json<ListSecretsResponse>, ApiError> {
///     // caller.account_id scopes every store call
/// }
/// ```
pub struct Caller(pub AuthenticatedAccount);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedAccount>()
            .cloned()
            .map(Caller)
            .ok_or(AuthError::MissingAuthHeader)
    }
}

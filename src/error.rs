// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wire error shape shared by every listener: `{"error": "...", "code": "..."}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthError;
use crate::service::ServiceError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_argument", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// Generic internal failure. Detail must already be logged by the caller.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal error")
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::InvalidArgument(reason) => Self::invalid_argument(reason),
            ServiceError::LoginTaken => {
                Self::new(StatusCode::CONFLICT, "already_exists", "login already taken")
            }
            ServiceError::WrongCredentials => Self::new(
                StatusCode::UNAUTHORIZED,
                "wrong_credentials",
                "wrong login or password",
            ),
            ServiceError::NotFound => Self::not_found("secret not found"),
            ServiceError::Unauthenticated(auth) => auth.into(),
            ServiceError::Cancelled => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "cancelled", "operation cancelled")
            }
            ServiceError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                Self::internal()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InternalError(detail) => {
                tracing::error!(error = %detail, "Authentication internal error");
                Self::internal()
            }
            other => Self::new(other.status_code(), other.error_code(), other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_code() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.code, "not_found");
        assert_eq!(nf.message, "missing");

        let bad = ApiError::invalid_argument("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.code, "invalid_argument");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::invalid_argument("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","code":"invalid_argument"}"#);
    }

    #[test]
    fn service_errors_map_to_statuses() {
        assert_eq!(ApiError::from(ServiceError::LoginTaken).status, StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(ServiceError::WrongCredentials).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::from(ServiceError::NotFound).status, StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(ServiceError::Unauthenticated(AuthError::TokenExpired)).code,
            "token_expired"
        );
    }

    #[test]
    fn internal_detail_is_withheld() {
        let err = ApiError::from(ServiceError::Internal("redb page 42 corrupt".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("redb"));
    }
}

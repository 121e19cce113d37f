// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Services
//!
//! Business logic between the call handlers and the stores. Services speak
//! domain outcomes (login taken, wrong credentials, not found) and never leak
//! storage vocabulary to callers.

pub mod accounts;
pub mod secrets;

pub use accounts::AccountService;
pub use secrets::{field_patch, SecretService};

use crate::auth::AuthError;
use crate::storage::StoreError;

/// Domain error returned by every service method.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request is structurally valid but semantically unacceptable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("login already taken")]
    LoginTaken,

    /// Unknown login and wrong password are deliberately the same outcome.
    #[error("wrong login or password")]
    WrongCredentials,

    #[error("secret not found")]
    NotFound,

    #[error("unauthenticated: {0}")]
    Unauthenticated(AuthError),

    #[error("operation cancelled")]
    Cancelled,

    /// Detail is for the log only; callers get a generic message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Cancelled => ServiceError::Cancelled,
            StoreError::NotFound(_) => ServiceError::NotFound,
            StoreError::MergeRejected(reason) => ServiceError::InvalidArgument(reason),
            StoreError::Stream(reason) => ServiceError::InvalidArgument(reason),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InternalError(detail) => ServiceError::Internal(detail),
            other => ServiceError::Unauthenticated(other),
        }
    }
}

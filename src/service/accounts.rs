// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account registration and login.

use std::sync::Arc;

use tokio::sync::OnceCell;

use super::ServiceError;
use crate::auth::{hash_password, verify_password, TokenIssuer};
use crate::models::{Credentials, NewAccount};
use crate::storage::{IdentityStore, OpContext, StoreError};

/// Registers accounts and exchanges credentials for access tokens.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn IdentityStore>,
    tokens: TokenIssuer,
    /// Hash verified against for unknown logins, so they cost as much as a
    /// wrong password.
    decoy_hash: Arc<OnceCell<String>>,
}

impl AccountService {
    pub fn new(store: Arc<dyn IdentityStore>, tokens: TokenIssuer) -> Self {
        Self {
            store,
            tokens,
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    async fn decoy_hash(&self) -> Result<String, ServiceError> {
        let hash = self
            .decoy_hash
            .get_or_try_init(|| hash_password(uuid::Uuid::new_v4().to_string()))
            .await?;
        Ok(hash.clone())
    }

    /// Token issuer shared with the auth interceptor.
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Create an account and return its first access token.
    pub async fn register(
        &self,
        ctx: &OpContext,
        credentials: Credentials,
    ) -> Result<String, ServiceError> {
        let password_hash = hash_password(credentials.password).await?;

        let account = self
            .store
            .create_account(
                ctx,
                NewAccount {
                    login: credentials.login,
                    password_hash,
                },
            )
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => ServiceError::LoginTaken,
                other => other.into(),
            })?;

        tracing::info!(account_id = %account.id, "Account registered");
        Ok(self.tokens.issue(&account)?)
    }

    /// Exchange credentials for an access token.
    pub async fn login(
        &self,
        ctx: &OpContext,
        credentials: Credentials,
    ) -> Result<String, ServiceError> {
        let account = self.store.get_account(ctx, &credentials.login).await?;

        // Skip hashing for abandoned calls.
        ctx.ensure_active()?;
        let Some(account) = account else {
            verify_password(credentials.password, self.decoy_hash().await?).await?;
            tracing::debug!("Login for unknown account");
            return Err(ServiceError::WrongCredentials);
        };

        if !verify_password(credentials.password, account.password_hash.clone()).await? {
            tracing::debug!(account_id = %account.id, "Login with wrong password");
            return Err(ServiceError::WrongCredentials);
        }

        Ok(self.tokens.issue(&account)?)
    }
}

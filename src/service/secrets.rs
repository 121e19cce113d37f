// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Owner-scoped secret operations.
//!
//! Every method takes the caller's [`AuthenticatedAccount`] and scopes the
//! store call by its account id. Request bodies never carry an owner.

use std::sync::Arc;

use uuid::Uuid;

use super::ServiceError;
use crate::auth::AuthenticatedAccount;
use crate::models::{
    CreateSecretRequest, NewSecret, Secret, SecretRecord, SecretSummary, SecretUpdate,
    UpdateSecretRequest,
};
use crate::storage::{ChunkStream, OpContext, SecretStore, StoreError, StoreResult};

/// Field-level patch used for conditional updates.
///
/// Each `Some` field replaces the current value and `None` keeps it. Returns
/// `false` when nothing would change, so the store skips the write. An
/// explicitly empty name is rejected.
pub fn field_patch(record: &mut SecretRecord, update: &SecretUpdate) -> StoreResult<bool> {
    let mut changed = false;

    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            return Err(StoreError::MergeRejected("name must not be empty".into()));
        }
        if *name != record.name {
            record.name = name.clone();
            changed = true;
        }
    }
    if let Some(secret_type) = update.secret_type {
        if secret_type != record.secret_type {
            record.secret_type = secret_type;
            changed = true;
        }
    }
    if let Some(metadata) = &update.metadata {
        if *metadata != record.metadata {
            record.metadata = metadata.clone();
            changed = true;
        }
    }
    if let Some(comment) = &update.comment {
        if *comment != record.comment {
            record.comment = comment.clone();
            changed = true;
        }
    }

    Ok(changed)
}

/// Secret CRUD plus streamed payload access.
#[derive(Clone)]
pub struct SecretService {
    store: Arc<dyn SecretStore>,
}

impl SecretService {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        ctx: &OpContext,
        caller: &AuthenticatedAccount,
        request: CreateSecretRequest,
    ) -> Result<Uuid, ServiceError> {
        let id = self
            .store
            .create_secret(
                ctx,
                NewSecret {
                    owner_id: caller.account_id,
                    name: request.name,
                    secret_type: request.secret_type,
                    metadata: request.metadata,
                    data: request.data,
                    comment: request.comment,
                },
            )
            .await?;
        tracing::info!(secret_id = %id, account_id = %caller.account_id, "Secret created");
        Ok(id)
    }

    pub async fn get(
        &self,
        ctx: &OpContext,
        caller: &AuthenticatedAccount,
        id: Uuid,
    ) -> Result<Secret, ServiceError> {
        self.store
            .get_secret(ctx, caller.account_id, id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn list(
        &self,
        ctx: &OpContext,
        caller: &AuthenticatedAccount,
    ) -> Result<Vec<SecretSummary>, ServiceError> {
        Ok(self.store.list_secrets(ctx, caller.account_id).await?)
    }

    /// Apply a field-level patch; returns whether anything was written.
    pub async fn update(
        &self,
        ctx: &OpContext,
        caller: &AuthenticatedAccount,
        request: UpdateSecretRequest,
    ) -> Result<bool, ServiceError> {
        let (id, update) = request.into_parts();
        let applied = self
            .store
            .update_secret(ctx, caller.account_id, id, update, Box::new(field_patch))
            .await?;
        tracing::info!(secret_id = %id, applied, "Secret update processed");
        Ok(applied)
    }

    pub async fn delete(
        &self,
        ctx: &OpContext,
        caller: &AuthenticatedAccount,
        id: Uuid,
    ) -> Result<(), ServiceError> {
        self.store.delete_secret(ctx, caller.account_id, id).await?;
        tracing::info!(secret_id = %id, account_id = %caller.account_id, "Secret deleted");
        Ok(())
    }

    /// Append a streamed payload after confirming ownership.
    pub async fn update_data(
        &self,
        ctx: &OpContext,
        caller: &AuthenticatedAccount,
        id: Uuid,
        chunks: ChunkStream,
    ) -> Result<u64, ServiceError> {
        self.ensure_owned(ctx, caller, id).await?;
        let written = self.store.update_secret_data(ctx, id, chunks).await?;
        tracing::info!(secret_id = %id, bytes = written, "Secret payload written");
        Ok(written)
    }

    /// Open the payload stream after confirming ownership.
    pub async fn get_data(
        &self,
        ctx: &OpContext,
        caller: &AuthenticatedAccount,
        id: Uuid,
    ) -> Result<ChunkStream, ServiceError> {
        self.ensure_owned(ctx, caller, id).await?;
        Ok(self.store.get_secret_data(ctx, id).await?)
    }

    async fn ensure_owned(
        &self,
        ctx: &OpContext,
        caller: &AuthenticatedAccount,
        id: Uuid,
    ) -> Result<(), ServiceError> {
        match self.store.find_record(ctx, caller.account_id, id).await? {
            Some(_) => Ok(()),
            None => Err(ServiceError::NotFound),
        }
    }
}

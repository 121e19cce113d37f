// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret store: owner-scoped secret rows plus chunked payloads.
//!
//! ## Consistency
//!
//! - Conditional updates hold the row lock across read → merge → write, so two
//!   updaters of the same secret are strictly serialized and the second merge
//!   always sees the first one's committed row.
//! - Payload uploads hold a per-secret payload lock for the whole stream.
//!   Lock order is always payload → row; deletion follows the same order.
//! - Readers never block on either lock. A redb read transaction observes a
//!   committed snapshot, so a half-written row is never visible.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use redb::{ReadableTable, WriteTransaction};
use uuid::Uuid;

use super::database::{decode, Database, OWNER_SECRET_INDEX, SECRETS, SECRET_DATA};
use super::locks::{KeyGuard, KeyedLocks};
use super::{OpContext, StoreError, StoreResult};
use crate::models::{NewSecret, Secret, SecretRecord, SecretSummary, SecretUpdate};
use crate::retry::retry;

/// Size of one stored payload portion (1 MiB).
pub const DATA_PORTION_SIZE: usize = 1024 * 1024;

/// Ordered, forward-only sequence of payload chunks.
pub type ChunkStream = BoxStream<'static, StoreResult<Bytes>>;

/// Caller-supplied merge step of a conditional update.
///
/// Receives the locked current row (mutable) and the proposed changes;
/// returns whether the merged row should be written.
pub type MergeFn = Box<dyn FnOnce(&mut SecretRecord, &SecretUpdate) -> StoreResult<bool> + Send>;

/// Secret persistence used by the secret service.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Insert a new secret with its initial payload; returns the generated id.
    async fn create_secret(&self, ctx: &OpContext, secret: NewSecret) -> StoreResult<Uuid>;

    /// Owner-scoped lookup including the payload. Absence is `Ok(None)`.
    async fn get_secret(&self, ctx: &OpContext, owner: Uuid, id: Uuid)
        -> StoreResult<Option<Secret>>;

    /// Owner-scoped lookup of the row alone, without touching the payload.
    async fn find_record(
        &self,
        ctx: &OpContext,
        owner: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<SecretRecord>>;

    /// All secrets of `owner`, most recently updated first, without payloads.
    async fn list_secrets(&self, ctx: &OpContext, owner: Uuid) -> StoreResult<Vec<SecretSummary>>;

    /// Transactional conditional update.
    ///
    /// Returns `Ok(false)` when `merge` declined to write. A missing or
    /// foreign row is [`StoreError::NotFound`].
    async fn update_secret(
        &self,
        ctx: &OpContext,
        owner: Uuid,
        id: Uuid,
        proposed: SecretUpdate,
        merge: MergeFn,
    ) -> StoreResult<bool>;

    /// Append a streamed payload; returns the number of bytes written.
    async fn update_secret_data(
        &self,
        ctx: &OpContext,
        id: Uuid,
        chunks: ChunkStream,
    ) -> StoreResult<u64>;

    /// Lazily stream the stored payload in order.
    async fn get_secret_data(&self, ctx: &OpContext, id: Uuid) -> StoreResult<ChunkStream>;

    /// Owner-scoped delete of the row, its index entry, and its payload.
    async fn delete_secret(&self, ctx: &OpContext, owner: Uuid, id: Uuid) -> StoreResult<()>;
}

// =============================================================================
// Index Key Helpers
// =============================================================================

const INDEX_KEY_LEN: usize = 16 + 8 + 16;

/// Build a composite key for the owner_secret_index table.
///
/// Format: `owner_id | inverted_updated_at_micros_be | secret_id`
///
/// The inverted timestamp ensures newest-first ordering when scanning forward.
fn make_index_key(owner: Uuid, updated_at: DateTime<Utc>, id: Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(INDEX_KEY_LEN);
    key.extend_from_slice(owner.as_bytes());
    key.extend_from_slice(&(!(updated_at.timestamp_micros() as u64)).to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Inclusive bounds covering every index key of one owner.
fn owner_range(owner: Uuid) -> (Vec<u8>, Vec<u8>) {
    let start = owner.as_bytes().to_vec();
    let mut end = start.clone();
    end.extend_from_slice(&[0xFF; INDEX_KEY_LEN - 16]);
    (start, end)
}

fn not_found(id: Uuid) -> StoreError {
    StoreError::NotFound(format!("secret {id}"))
}

/// Read one row and check ownership. A foreign row reads as absent.
fn load_owned<T>(table: &T, owner: Uuid, id: Uuid) -> StoreResult<Option<SecretRecord>>
where
    T: ReadableTable<u128, &'static [u8]>,
{
    let Some(value) = table.get(id.as_u128())? else {
        return Ok(None);
    };
    let record: SecretRecord = decode(value.value())?;
    Ok((record.owner_id == owner).then_some(record))
}

/// Index of the next payload chunk for `id`.
fn next_chunk_index<T>(table: &T, id: Uuid) -> StoreResult<u32>
where
    T: ReadableTable<(u128, u32), &'static [u8]>,
{
    let raw = id.as_u128();
    match table.range((raw, 0u32)..=(raw, u32::MAX))?.next_back() {
        Some(entry) => {
            let (key, _) = entry?;
            key.value()
                .1
                .checked_add(1)
                .ok_or_else(|| StoreError::Stream(format!("secret {id} has too many chunks")))
        }
        None => Ok(0),
    }
}

/// Rewrite a row and move its index entry from `previous_updated_at`.
fn rewrite_record(
    txn: &WriteTransaction,
    record: &SecretRecord,
    previous_updated_at: DateTime<Utc>,
) -> StoreResult<()> {
    let json = serde_json::to_vec(record)?;
    let mut secrets = txn.open_table(SECRETS)?;
    secrets.insert(record.id.as_u128(), json.as_slice())?;

    let mut index = txn.open_table(OWNER_SECRET_INDEX)?;
    let old_key = make_index_key(record.owner_id, previous_updated_at, record.id);
    index.remove(old_key.as_slice())?;
    let new_key = make_index_key(record.owner_id, record.updated_at, record.id);
    index.insert(new_key.as_slice(), record.id.as_u128())?;
    Ok(())
}

/// Wait for a lock unless the caller gives up first.
async fn acquire<F>(ctx: &OpContext, lock: F) -> StoreResult<KeyGuard>
where
    F: std::future::Future<Output = KeyGuard>,
{
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(StoreError::Cancelled),
        guard = lock => Ok(guard),
    }
}

// =============================================================================
// RedbSecretStore
// =============================================================================

/// redb-backed secret store.
#[derive(Clone)]
pub struct RedbSecretStore {
    db: Database,
    payload_locks: Arc<KeyedLocks<Uuid>>,
}

impl RedbSecretStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            payload_locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Store one payload portion as chunk `index`, with a fresh retry budget.
    async fn append_portion(
        &self,
        ctx: &OpContext,
        id: Uuid,
        index: u32,
        portion: Bytes,
    ) -> StoreResult<()> {
        retry(&ctx.cancel, &ctx.retry, || {
            let portion = portion.clone();
            self.db.write(move |txn| {
                let mut data = txn.open_table(SECRET_DATA)?;
                data.insert((id.as_u128(), index), portion.as_ref())?;
                Ok(())
            })
        })
        .await
    }

    /// Bump `updated_at` of a row under its row lock.
    async fn touch(&self, ctx: &OpContext, id: Uuid) -> StoreResult<()> {
        let _row = acquire(ctx, self.db.lock_row(id)).await?;
        retry(&ctx.cancel, &ctx.retry, || {
            self.db.write(move |txn| {
                let current = {
                    let secrets = txn.open_table(SECRETS)?;
                    let value = secrets.get(id.as_u128())?.ok_or_else(|| not_found(id))?;
                    decode::<SecretRecord>(value.value())?
                };
                let mut touched = current.clone();
                touched.updated_at = Utc::now().max(current.updated_at);
                rewrite_record(txn, &touched, current.updated_at)
            })
        })
        .await
    }
}

#[async_trait]
impl SecretStore for RedbSecretStore {
    async fn create_secret(&self, ctx: &OpContext, secret: NewSecret) -> StoreResult<Uuid> {
        let now = Utc::now();
        let record = SecretRecord {
            id: Uuid::new_v4(),
            owner_id: secret.owner_id,
            name: secret.name,
            secret_type: secret.secret_type,
            metadata: secret.metadata,
            comment: secret.comment,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_vec(&record)?;
        let data = Bytes::from(secret.data);
        let index_key = make_index_key(record.owner_id, record.updated_at, record.id);
        let raw_id = record.id.as_u128();

        retry(&ctx.cancel, &ctx.retry, || {
            let json = json.clone();
            let data = data.clone();
            let index_key = index_key.clone();
            self.db.write(move |txn| {
                let mut secrets = txn.open_table(SECRETS)?;
                if secrets.get(raw_id)?.is_some() {
                    return Err(StoreError::Conflict(format!("secret id {raw_id:x} in use")));
                }
                secrets.insert(raw_id, json.as_slice())?;

                let mut index = txn.open_table(OWNER_SECRET_INDEX)?;
                index.insert(index_key.as_slice(), raw_id)?;

                let mut chunks = txn.open_table(SECRET_DATA)?;
                for (i, portion) in data.chunks(DATA_PORTION_SIZE).enumerate() {
                    chunks.insert((raw_id, i as u32), portion)?;
                }
                Ok(())
            })
        })
        .await?;

        tracing::debug!(secret_id = %record.id, owner_id = %record.owner_id, "Secret created");
        Ok(record.id)
    }

    async fn get_secret(
        &self,
        ctx: &OpContext,
        owner: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Secret>> {
        retry(&ctx.cancel, &ctx.retry, || {
            self.db.read(move |txn| {
                let secrets = txn.open_table(SECRETS)?;
                let Some(record) = load_owned(&secrets, owner, id)? else {
                    return Ok(None);
                };

                let chunks = txn.open_table(SECRET_DATA)?;
                let raw = id.as_u128();
                let mut data = Vec::new();
                for entry in chunks.range((raw, 0u32)..=(raw, u32::MAX))? {
                    let (_, portion) = entry?;
                    data.extend_from_slice(portion.value());
                }
                Ok(Some(Secret { record, data }))
            })
        })
        .await
    }

    async fn find_record(
        &self,
        ctx: &OpContext,
        owner: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<SecretRecord>> {
        retry(&ctx.cancel, &ctx.retry, || {
            self.db.read(move |txn| {
                let secrets = txn.open_table(SECRETS)?;
                load_owned(&secrets, owner, id)
            })
        })
        .await
    }

    async fn list_secrets(&self, ctx: &OpContext, owner: Uuid) -> StoreResult<Vec<SecretSummary>> {
        retry(&ctx.cancel, &ctx.retry, || {
            self.db.read(move |txn| {
                let index = txn.open_table(OWNER_SECRET_INDEX)?;
                let secrets = txn.open_table(SECRETS)?;
                let (start, end) = owner_range(owner);

                let mut summaries = Vec::new();
                for entry in index.range(start.as_slice()..=end.as_slice())? {
                    let (_, id) = entry?;
                    let id = Uuid::from_u128(id.value());
                    // Index and rows commit together; a gap means a concurrent delete.
                    if let Some(record) = load_owned(&secrets, owner, id)? {
                        summaries.push(SecretSummary::from(record));
                    }
                }
                Ok(summaries)
            })
        })
        .await
    }

    async fn update_secret(
        &self,
        ctx: &OpContext,
        owner: Uuid,
        id: Uuid,
        proposed: SecretUpdate,
        merge: MergeFn,
    ) -> StoreResult<bool> {
        let _row = acquire(ctx, self.db.lock_row(id)).await?;

        let current = retry(&ctx.cancel, &ctx.retry, || {
            self.db.read(move |txn| {
                let secrets = txn.open_table(SECRETS)?;
                load_owned(&secrets, owner, id)
            })
        })
        .await?
        .ok_or_else(|| not_found(id))?;

        let mut merged = current.clone();
        if !merge(&mut merged, &proposed)? {
            tracing::debug!(secret_id = %id, "Update declined by merge");
            return Ok(false);
        }

        // Identity and creation time are not the merge's to change.
        merged.id = current.id;
        merged.owner_id = current.owner_id;
        merged.created_at = current.created_at;
        merged.updated_at = Utc::now().max(current.updated_at);

        let previous_updated_at = current.updated_at;
        retry(&ctx.cancel, &ctx.retry, || {
            let merged = merged.clone();
            self.db
                .write(move |txn| rewrite_record(txn, &merged, previous_updated_at))
        })
        .await?;

        tracing::debug!(secret_id = %id, "Secret updated");
        Ok(true)
    }

    async fn update_secret_data(
        &self,
        ctx: &OpContext,
        id: Uuid,
        mut chunks: ChunkStream,
    ) -> StoreResult<u64> {
        let _payload = acquire(ctx, self.payload_locks.lock(&id)).await?;

        let mut next_index = retry(&ctx.cancel, &ctx.retry, || {
            self.db.read(move |txn| {
                let secrets = txn.open_table(SECRETS)?;
                if secrets.get(id.as_u128())?.is_none() {
                    return Err(not_found(id));
                }
                let data = txn.open_table(SECRET_DATA)?;
                next_chunk_index(&data, id)
            })
        })
        .await?;

        let mut buffer = BytesMut::with_capacity(DATA_PORTION_SIZE);
        let mut written: u64 = 0;

        let outcome = async {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return Err(StoreError::Cancelled),
                    next = chunks.next() => next,
                };
                let Some(chunk) = next else { break };
                let mut chunk = chunk?;

                while !chunk.is_empty() {
                    let take = (DATA_PORTION_SIZE - buffer.len()).min(chunk.len());
                    buffer.extend_from_slice(&chunk.split_to(take));

                    if buffer.len() == DATA_PORTION_SIZE {
                        let portion = buffer.split().freeze();
                        self.append_portion(ctx, id, next_index, portion).await?;
                        written += DATA_PORTION_SIZE as u64;
                        next_index = next_index.checked_add(1).ok_or_else(|| {
                            StoreError::Stream(format!("secret {id} has too many chunks"))
                        })?;
                    }
                }
            }

            if !buffer.is_empty() {
                let len = buffer.len() as u64;
                self.append_portion(ctx, id, next_index, buffer.split().freeze())
                    .await?;
                written += len;
            }
            Ok::<(), StoreError>(())
        }
        .await;

        // Flushed portions stay even when the stream failed; keep updated_at honest.
        if written > 0 {
            if let Err(e) = self.touch(ctx, id).await {
                if outcome.is_ok() {
                    return Err(e);
                }
                tracing::warn!(secret_id = %id, error = %e, "Timestamp bump after failed stream");
            }
        }
        outcome?;

        tracing::debug!(secret_id = %id, bytes = written, "Payload appended");
        Ok(written)
    }

    async fn get_secret_data(&self, ctx: &OpContext, id: Uuid) -> StoreResult<ChunkStream> {
        let count = retry(&ctx.cancel, &ctx.retry, || {
            self.db.read(move |txn| {
                let secrets = txn.open_table(SECRETS)?;
                if secrets.get(id.as_u128())?.is_none() {
                    return Err(not_found(id));
                }
                let data = txn.open_table(SECRET_DATA)?;
                next_chunk_index(&data, id)
            })
        })
        .await?;

        let db = self.db.clone();
        let ctx = ctx.clone();
        let stream = futures::stream::try_unfold(0u32, move |index| {
            let db = db.clone();
            let ctx = ctx.clone();
            async move {
                if index >= count {
                    return StoreResult::Ok(None);
                }
                let chunk = retry(&ctx.cancel, &ctx.retry, || {
                    db.read(move |txn| {
                        let data = txn.open_table(SECRET_DATA)?;
                        let portion = data
                            .get((id.as_u128(), index))?
                            .ok_or_else(|| not_found(id))?;
                        Ok(Bytes::copy_from_slice(portion.value()))
                    })
                })
                .await?;
                Ok(Some((chunk, index + 1)))
            }
        });

        Ok(stream.boxed())
    }

    async fn delete_secret(&self, ctx: &OpContext, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let _payload = acquire(ctx, self.payload_locks.lock(&id)).await?;
        let _row = acquire(ctx, self.db.lock_row(id)).await?;

        retry(&ctx.cancel, &ctx.retry, || {
            self.db.write(move |txn| {
                let raw = id.as_u128();
                let record = {
                    let secrets = txn.open_table(SECRETS)?;
                    load_owned(&secrets, owner, id)?.ok_or_else(|| not_found(id))?
                };

                {
                    let mut secrets = txn.open_table(SECRETS)?;
                    secrets.remove(raw)?;
                    let mut index = txn.open_table(OWNER_SECRET_INDEX)?;
                    let key = make_index_key(record.owner_id, record.updated_at, record.id);
                    index.remove(key.as_slice())?;
                }

                let mut data = txn.open_table(SECRET_DATA)?;
                let mut indexes = Vec::new();
                for entry in data.range((raw, 0u32)..=(raw, u32::MAX))? {
                    let (key, _) = entry?;
                    indexes.push(key.value().1);
                }
                for index in indexes {
                    data.remove((raw, index))?;
                }
                Ok(())
            })
        })
        .await?;

        tracing::debug!(secret_id = %id, "Secret deleted");
        Ok(())
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded relational store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: login → serialized Account (JSON bytes)
//! - `secrets`: secret_id (u128) → serialized SecretRecord (JSON bytes)
//! - `owner_secret_index`: composite key (owner|!updated_at|secret_id) → secret_id
//! - `secret_data`: (secret_id, chunk_index) → payload portion
//!
//! redb gives atomic, isolated transactions: a reader sees either the whole
//! committed row or the previous version. Row-level exclusive locks for the
//! read-merge-write path are layered on top through [`Database::lock_row`].
//!
//! All table access runs on the blocking pool so callers stay async.

use std::path::Path;
use std::sync::Arc;

use redb::{ReadTransaction, ReadableDatabase, TableDefinition, WriteTransaction};
use uuid::Uuid;

use super::locks::{KeyGuard, KeyedLocks};
use super::{StoreError, StoreResult};

// =============================================================================
// Table Definitions
// =============================================================================

/// Accounts keyed by their unique login.
pub(crate) const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

/// Secret rows (without payload) keyed by secret id.
pub(crate) const SECRETS: TableDefinition<u128, &[u8]> = TableDefinition::new("secrets");

/// Listing index: `owner | !updated_at_micros | secret_id` → secret id.
pub(crate) const OWNER_SECRET_INDEX: TableDefinition<&[u8], u128> =
    TableDefinition::new("owner_secret_index");

/// Payload portions: `(secret_id, chunk_index)` → bytes.
pub(crate) const SECRET_DATA: TableDefinition<(u128, u32), &[u8]> =
    TableDefinition::new("secret_data");

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the embedded store.
///
/// Cloning is cheap; all clones share the same redb instance and row locks.
#[derive(Clone)]
pub struct Database {
    db: Arc<redb::Database>,
    row_locks: Arc<KeyedLocks<Uuid>>,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::DataDir)?;
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(SECRETS)?;
            let _ = write_txn.open_table(OWNER_SECRET_INDEX)?;
            let _ = write_txn.open_table(SECRET_DATA)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Database opened");

        Ok(Self {
            db: Arc::new(db),
            row_locks: Arc::new(KeyedLocks::new()),
        })
    }

    /// Run `f` inside a read transaction on the blocking pool.
    pub async fn read<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ReadTransaction) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read()?;
            f(&read_txn)
        })
        .await?
    }

    /// Run `f` inside a write transaction on the blocking pool.
    ///
    /// The transaction commits only if `f` succeeds; otherwise it is aborted
    /// and nothing `f` wrote becomes visible.
    pub async fn write<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&WriteTransaction) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write()?;
            match f(&write_txn) {
                Ok(value) => {
                    write_txn.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    if let Err(abort_err) = write_txn.abort() {
                        tracing::warn!(error = %abort_err, "Write transaction abort failed");
                    }
                    Err(e)
                }
            }
        })
        .await?
    }

    /// Take the exclusive lock on one row.
    ///
    /// Held across read → merge → write, this serializes updaters of the same
    /// row without touching other rows.
    pub async fn lock_row(&self, id: Uuid) -> KeyGuard {
        self.row_locks.lock(&id).await
    }

    /// Verify the store accepts a read transaction.
    pub async fn health_check(&self) -> StoreResult<()> {
        self.read(|txn| {
            let _ = txn.open_table(SECRETS)?;
            Ok(())
        })
        .await
    }
}

/// Read and decode a JSON value.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;
    use redb::ReadableTable;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn write_commits_on_success() {
        let (db, _dir) = temp_db();
        db.write(|txn| {
            let mut table = txn.open_table(ACCOUNTS)?;
            table.insert("alice", b"{}".as_slice())?;
            Ok(())
        })
        .await
        .unwrap();

        let found = db
            .read(|txn| {
                let table = txn.open_table(ACCOUNTS)?;
                Ok(table.get("alice")?.is_some())
            })
            .await
            .unwrap();
        assert!(found);
    }

    #[tokio::test]
    async fn write_discards_changes_on_error() {
        let (db, _dir) = temp_db();
        let result: StoreResult<()> = db
            .write(|txn| {
                let mut table = txn.open_table(ACCOUNTS)?;
                table.insert("bob", b"{}".as_slice())?;
                Err(StoreError::Conflict("forced".into()))
            })
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        let found = db
            .read(|txn| {
                let table = txn.open_table(ACCOUNTS)?;
                Ok(table.get("bob")?.is_some())
            })
            .await
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn open_reports_unusable_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = Database::open(&blocker.join("vault.redb")).err().unwrap();
        assert!(matches!(err, StoreError::DataDir(_)));
    }

    #[tokio::test]
    async fn health_check_passes_on_fresh_database() {
        let (db, _dir) = temp_db();
        db.health_check().await.unwrap();
    }
}

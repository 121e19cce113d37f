// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storage error type and its retry classification.

use crate::retry::{Classify, ErrorClass};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A uniqueness constraint was violated.
    #[error("data conflict: {0}")]
    Conflict(String),

    /// The row does not exist or is not visible to the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller's merge function refused the proposed changes.
    #[error("update rejected: {0}")]
    MergeRejected(String),

    /// The inbound chunk producer failed mid-stream.
    #[error("payload stream failed: {0}")]
    Stream(String),

    /// The directory holding the database file could not be created.
    #[error("cannot prepare data directory: {0}")]
    DataDir(#[source] std::io::Error),

    /// A blocking storage task panicked or was aborted.
    #[error("storage task failed: {0}")]
    Task(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    fn storage_class(err: &redb::StorageError) -> ErrorClass {
        match err {
            redb::StorageError::Io(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }
}

impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::RedbStorage(e) => Self::storage_class(e),
            StoreError::RedbTransaction(redb::TransactionError::Storage(e)) => {
                Self::storage_class(e)
            }
            StoreError::RedbCommit(redb::CommitError::Storage(e)) => Self::storage_class(e),
            StoreError::RedbTable(redb::TableError::Storage(e)) => Self::storage_class(e),
            StoreError::Redb(redb::Error::Io(_)) => ErrorClass::Transient,
            StoreError::Conflict(_) | StoreError::NotFound(_) | StoreError::MergeRejected(_) => {
                ErrorClass::Permanent
            }
            _ => ErrorClass::Fatal,
        }
    }

    fn cancelled() -> Self {
        StoreError::Cancelled
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}

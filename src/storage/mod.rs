// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent storage for accounts and secrets on top of an embedded redb
//! database. The service layer never touches tables directly; it depends on
//! the [`IdentityStore`] and [`SecretStore`] capability traits so any backend
//! (or an in-test double) can stand in.
//!
//! ## Concurrency Model
//!
//! - Every store call takes an [`OpContext`] carrying the caller's
//!   cancellation token and retry policy.
//! - Transient storage faults are retried inside the store through
//!   [`crate::retry::retry`]; callers only see them once the budget is spent.
//! - Conditional updates serialize on a per-row lock; payload streams
//!   serialize on a per-secret payload lock. Neither is global.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   vault.redb    # accounts, secrets, owner index, payload chunks
//! ```

pub mod accounts;
pub mod database;
pub mod error;
pub mod locks;
pub mod secrets;

use tokio_util::sync::CancellationToken;

use crate::retry::RetryPolicy;

pub use accounts::{IdentityStore, RedbAccountStore};
pub use database::Database;
pub use error::{StoreError, StoreResult};
pub use locks::{KeyGuard, KeyedLocks};
pub use secrets::{ChunkStream, MergeFn, RedbSecretStore, SecretStore, DATA_PORTION_SIZE};

/// Per-call execution context for store operations.
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Aborts retries, backoff waits, and payload streams.
    pub cancel: CancellationToken,
    /// Retry budget for each individual store round trip.
    pub retry: RetryPolicy,
}

impl OpContext {
    pub fn new(cancel: CancellationToken, retry: RetryPolicy) -> Self {
        Self { cancel, retry }
    }

    /// Context that is never cancelled and uses the default retry policy.
    pub fn background() -> Self {
        Self::new(CancellationToken::new(), RetryPolicy::default())
    }

    /// Fail fast if the caller already gave up.
    pub fn ensure_active(&self) -> StoreResult<()> {
        if self.cancel.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

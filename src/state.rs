// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use tokio_util::sync::CancellationToken;

use crate::retry::RetryPolicy;
use crate::service::{AccountService, SecretService};
use crate::storage::OpContext;

/// Shared state of the primary RPC listener.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub secrets: SecretService,
    /// Retry policy applied to every store round trip.
    pub retry: RetryPolicy,
    /// Cancelled once shutdown gives up on draining; aborts in-flight store calls.
    pub abort: CancellationToken,
}

impl AppState {
    pub fn new(accounts: AccountService, secrets: SecretService, abort: CancellationToken) -> Self {
        Self {
            accounts,
            secrets,
            retry: RetryPolicy::default(),
            abort,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fresh store context for one call, cancelled together with `abort`.
    pub fn op_context(&self) -> OpContext {
        OpContext::new(self.abort.child_token(), self.retry.clone())
    }
}

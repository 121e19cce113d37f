// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity store: account rows keyed by login.

use async_trait::async_trait;
use chrono::Utc;
use redb::ReadableTable;
use uuid::Uuid;

use super::database::{decode, Database, ACCOUNTS};
use super::{OpContext, StoreError, StoreResult};
use crate::models::{Account, NewAccount};
use crate::retry::retry;

/// Account persistence used by the account service.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert a new account.
    ///
    /// A taken login yields [`StoreError::Conflict`], never a generic failure.
    async fn create_account(&self, ctx: &OpContext, account: NewAccount) -> StoreResult<Account>;

    /// Look up an account by login. Absence is `Ok(None)`.
    async fn get_account(&self, ctx: &OpContext, login: &str) -> StoreResult<Option<Account>>;
}

/// redb-backed identity store.
#[derive(Clone)]
pub struct RedbAccountStore {
    db: Database,
}

impl RedbAccountStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityStore for RedbAccountStore {
    async fn create_account(&self, ctx: &OpContext, account: NewAccount) -> StoreResult<Account> {
        let account = Account {
            id: Uuid::new_v4(),
            login: account.login,
            password_hash: account.password_hash,
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&account)?;

        retry(&ctx.cancel, &ctx.retry, || {
            let login = account.login.clone();
            let json = json.clone();
            self.db.write(move |txn| {
                let mut table = txn.open_table(ACCOUNTS)?;
                if table.get(login.as_str())?.is_some() {
                    return Err(StoreError::Conflict(format!("login {login} already exists")));
                }
                table.insert(login.as_str(), json.as_slice())?;
                Ok(())
            })
        })
        .await?;

        tracing::info!(account_id = %account.id, "Account created");
        Ok(account)
    }

    async fn get_account(&self, ctx: &OpContext, login: &str) -> StoreResult<Option<Account>> {
        retry(&ctx.cancel, &ctx.retry, || {
            let login = login.to_string();
            self.db.read(move |txn| {
                let table = txn.open_table(ACCOUNTS)?;
                match table.get(login.as_str())? {
                    Some(value) => Ok(Some(decode::<Account>(value.value())?)),
                    None => Ok(None),
                }
            })
        })
        .await
    }
}

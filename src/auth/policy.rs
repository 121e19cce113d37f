// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-call authentication requirements.
//!
//! The table is a plain value handed to the interceptor chain at router
//! construction. Calls absent from the table do **not** require
//! authentication (fail-open); handlers that need an identity still reject
//! through the [`Caller`](super::Caller) extractor.

use std::collections::HashMap;

use crate::rpc::calls;

/// Mapping from call name to "requires an authenticated identity".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequirements {
    table: HashMap<String, bool>,
}

impl AuthRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requirements for the vault's own calls.
    pub fn vault_defaults() -> Self {
        let mut requirements = Self::new()
            .with(calls::REGISTER_ACCOUNT, false)
            .with(calls::LOGIN, false);
        for call in calls::SECRET_CALLS {
            requirements = requirements.with(call, true);
        }
        requirements
    }

    /// Set the requirement for one call.
    pub fn with(mut self, call: &str, required: bool) -> Self {
        self.table.insert(call.to_string(), required);
        self
    }

    /// Whether `call` needs an authenticated identity. Unknown calls do not.
    pub fn requires_auth(&self, call: &str) -> bool {
        self.table.get(call).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_calls_are_public() {
        let requirements = AuthRequirements::vault_defaults();
        assert!(!requirements.requires_auth(calls::REGISTER_ACCOUNT));
        assert!(!requirements.requires_auth(calls::LOGIN));
    }

    #[test]
    fn secret_calls_require_auth() {
        let requirements = AuthRequirements::vault_defaults();
        for call in calls::SECRET_CALLS {
            assert!(requirements.requires_auth(call), "{call} should require auth");
        }
    }

    #[test]
    fn unknown_calls_fail_open() {
        let requirements = AuthRequirements::vault_defaults();
        assert!(!requirements.requires_auth("/vault.v1.SecretService/Nope"));
        assert!(!AuthRequirements::new().requires_auth(calls::GET_SECRET));
    }

    #[test]
    fn explicit_entries_override() {
        let requirements = AuthRequirements::vault_defaults().with(calls::LOGIN, true);
        assert!(requirements.requires_auth(calls::LOGIN));
    }
}

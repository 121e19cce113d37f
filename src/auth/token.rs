// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access token issuing and validation (HS256).

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};

use super::{AuthError, Claims};
use crate::models::Account;

/// Signs and verifies access tokens with a shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(signing_key: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(signing_key),
            decoding: DecodingKey::from_secret(signing_key),
            ttl,
        }
    }

    /// Issue a token for `account` with the configured lifetime.
    pub fn issue(&self, account: &Account) -> Result<String, AuthError> {
        self.issue_for(account, self.ttl)
    }

    /// Issue a token for `account` expiring `ttl` from now.
    pub fn issue_for(&self, account: &Account, ttl: Duration) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs())
            .map_err(|_| AuthError::InternalError("token lifetime out of range".into()))?;
        self.sign(&Claims {
            uid: account.id,
            login: account.login.clone(),
            iat,
            exp: iat.saturating_add(ttl),
        })
    }

    /// Verify signature and expiry; returns the embedded claims.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::InternalError(format!("token signing failed: {e}")))
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password credential hashing (Argon2id, PHC string format).
//!
//! Hashing is deliberately slow, so both operations run on the blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use super::AuthError;

/// Hash a plaintext password into a PHC string.
pub async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::InternalError(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| AuthError::InternalError(format!("hashing task failed: {e}")))?
}

/// Check a plaintext password against a stored PHC string.
///
/// A mismatch is `Ok(false)`; only an unreadable stored hash is an error.
pub async fn verify_password(password: String, phc: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&phc)
            .map_err(|e| AuthError::InternalError(format!("stored hash unreadable: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| AuthError::InternalError(format!("hashing task failed: {e}")))?
}

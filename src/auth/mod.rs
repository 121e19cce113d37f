// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Token-based authentication for the vault's remote calls.
//!
//! ## Auth Flow
//!
//! 1. A client registers or logs in and receives a signed access token
//! 2. The client sends `Authorization: Bearer <token>` with every call
//! 3. The auth interceptor:
//!    - Looks the call up in [`AuthRequirements`]
//!    - Verifies signature and expiry through [`TokenIssuer`]
//!    - Attaches an [`AuthenticatedAccount`] to the request
//! 4. Handlers read the identity with the [`Caller`] extractor and scope
//!    every store call by its account id
//!
//! ## Security
//!
//! - Tokens are HS256 with zero clock-skew leeway
//! - Passwords are stored as Argon2id PHC strings, never in plaintext
//! - Calls missing from the requirement table are public (fail-open)

pub mod claims;
pub mod error;
pub mod password;
pub mod policy;
pub mod token;

pub use claims::{AuthenticatedAccount, Caller, Claims};
pub use error::AuthError;
pub use password::{hash_password, verify_password};
pub use policy::AuthRequirements;
pub use token::TokenIssuer;

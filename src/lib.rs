// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vault Server - Multi-tenant Secret Vault Service
//!
//! Authenticated accounts store, read, update and delete typed secrets. Every
//! store round trip runs under a retrying executor bound to the caller's
//! cancellation scope.
//!
//! ## Modules
//!
//! - `retry` - Backoff executor with transient/permanent error classification
//! - `storage` - redb-backed identity and secret stores
//! - `auth` - Tokens, password hashing, per-call requirements
//! - `service` - Account and secret business rules
//! - `rpc` - Primary RPC listener and its interceptor chain
//! - `gateway` - REST surface forwarding to the RPC listener
//! - `diagnostics` - Health, readiness and runtime endpoints
//! - `server` - Listener supervision and graceful shutdown

pub mod app;
pub mod auth;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod retry;
pub mod rpc;
pub mod server;
pub mod service;
pub mod state;
pub mod storage;

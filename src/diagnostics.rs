// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Diagnostics listener: liveness, readiness, runtime and build info.
//!
//! Bound to loopback by default. Never exposes secret material.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::watch;

use crate::server::LifecycleState;
use crate::storage::Database;

#[derive(Clone)]
pub struct DiagnosticsState {
    pub db: Database,
    pub lifecycle: watch::Receiver<LifecycleState>,
}

/// Simple status response for liveness checks.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness response with individual component status.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Overall status ("ok" or "degraded").
    pub status: String,
    pub lifecycle: LifecycleState,
    pub checks: ReadyChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadyChecks {
    pub store: String,
}

#[derive(Debug, Serialize)]
pub struct RuntimeResponse {
    pub workers: usize,
    pub alive_tasks: usize,
}

#[derive(Debug, Serialize)]
pub struct BuildResponse {
    pub name: &'static str,
    pub version: &'static str,
}

/// Liveness check. Always 200 while the process is serving.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check.
///
/// Returns 503 when the store rejects a read or the server is not running.
pub async fn ready(State(state): State<DiagnosticsState>) -> (StatusCode, Json<ReadyResponse>) {
    let store = match state.db.health_check().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            "unavailable".to_string()
        }
    };
    let lifecycle = *state.lifecycle.borrow();
    let all_ok = store == "ok" && lifecycle == LifecycleState::Running;

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        lifecycle,
        checks: ReadyChecks { store },
    };
    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

pub async fn runtime() -> Json<RuntimeResponse> {
    let metrics = tokio::runtime::Handle::current().metrics();
    Json(RuntimeResponse {
        workers: metrics.num_workers(),
        alive_tasks: metrics.num_alive_tasks(),
    })
}

pub async fn build() -> Json<BuildResponse> {
    Json(BuildResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: DiagnosticsState) -> Router {
    Router::new()
        .route("/debug/health", get(health))
        .route("/debug/ready", get(ready))
        .route("/debug/runtime", get(runtime))
        .route("/debug/build", get(build))
        .with_state(state)
}

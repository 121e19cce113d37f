// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wiring: storage, services and the three listeners.

use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthRequirements, TokenIssuer};
use crate::config::Config;
use crate::diagnostics::{self, DiagnosticsState};
use crate::gateway::{self, GatewayState};
use crate::rpc;
use crate::server::{Http2KeepAlive, HttpListener, Listener, ListenerError, Supervisor};
use crate::service::{AccountService, SecretService};
use crate::state::AppState;
use crate::storage::{Database, RedbAccountStore, RedbSecretStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot open store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("cannot build gateway client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A fully wired server, ready to run.
pub struct App {
    supervisor: Supervisor,
    listeners: Vec<Arc<dyn Listener>>,
}

impl App {
    pub async fn build(config: &Config) -> Result<Self, StartupError> {
        let db = Database::open(&config.database_path())?;
        let abort = CancellationToken::new();

        let tokens = TokenIssuer::new(config.signing_key.as_bytes(), config.token_ttl);
        let accounts = AccountService::new(Arc::new(RedbAccountStore::new(db.clone())), tokens);
        let secrets = SecretService::new(Arc::new(RedbSecretStore::new(db.clone())));
        let state = AppState::new(accounts, secrets, abort.clone());

        let tls = match &config.tls {
            Some(paths) => Some(
                RustlsConfig::from_pem_file(&paths.cert, &paths.key)
                    .await
                    .map_err(|source| ListenerError::Tls {
                        listener: "rpc",
                        source,
                    })?,
            ),
            None => None,
        };

        let mut rpc_listener = HttpListener::new(
            "rpc",
            config.rpc_addr,
            rpc::router(state, AuthRequirements::vault_defaults()),
            config.shutdown_grace,
        )
        .with_http2_keepalive(Http2KeepAlive {
            interval: config.rpc_keepalive_interval,
            timeout: config.rpc_keepalive_timeout,
        });

        let client = reqwest::Client::builder().build()?;
        let mut gateway_listener = HttpListener::new(
            "gateway",
            config.gateway_addr,
            gateway::router(GatewayState::new(client, config.gateway_upstream.clone())),
            config.shutdown_grace,
        );

        if let Some(tls) = tls {
            rpc_listener = rpc_listener.with_tls(tls.clone());
            gateway_listener = gateway_listener.with_tls(tls);
        }

        let supervisor = Supervisor::new(config.shutdown_grace, abort);
        let diagnostics_listener = HttpListener::new(
            "diagnostics",
            config.diag_addr,
            diagnostics::router(DiagnosticsState {
                db,
                lifecycle: supervisor.subscribe(),
            }),
            config.shutdown_grace,
        );

        tracing::info!(
            rpc = %config.rpc_addr,
            gateway = %config.gateway_addr,
            diagnostics = %config.diag_addr,
            upstream = %config.gateway_upstream,
            "Server configured"
        );

        Ok(Self {
            supervisor,
            listeners: vec![
                Arc::new(rpc_listener),
                Arc::new(gateway_listener),
                Arc::new(diagnostics_listener),
            ],
        })
    }

    /// Serve until `scope` is cancelled, then shut every listener down.
    pub async fn run(self, scope: CancellationToken) -> Result<(), ListenerError> {
        self.supervisor.run(self.listeners, scope).await
    }
}

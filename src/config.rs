// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded once from the environment at startup and shared
//! immutably afterwards.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `vault.redb` | `./data` |
//! | `VAULT_SIGNING_KEY` | Token signing secret | Required |
//! | `VAULT_TOKEN_TTL_SECS` | Token lifetime | `3600` |
//! | `RPC_HOST` / `RPC_PORT` | Primary RPC listener | `0.0.0.0` / `9090` |
//! | `GATEWAY_HOST` / `GATEWAY_PORT` | HTTP gateway listener | `0.0.0.0` / `8080` |
//! | `DIAG_HOST` / `DIAG_PORT` | Diagnostics listener | `127.0.0.1` / `2080` |
//! | `RPC_KEEPALIVE_SECS` | HTTP/2 keep-alive ping interval | `60` |
//! | `RPC_KEEPALIVE_TIMEOUT_SECS` | HTTP/2 keep-alive ping timeout | `20` |
//! | `GATEWAY_UPSTREAM_URL` | Base URL the gateway forwards to | `http://127.0.0.1:<RPC_PORT>` |
//! | `SHUTDOWN_GRACE_SECS` | Per-listener shutdown grace | `5` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM certificate chain and key | Unset (plain HTTP) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=info` |

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::logging::LogFormat;

/// Directory holding the embedded database file.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// HS256 signing secret for session tokens. Must be non-empty.
pub const SIGNING_KEY_ENV: &str = "VAULT_SIGNING_KEY";

pub const TOKEN_TTL_ENV: &str = "VAULT_TOKEN_TTL_SECS";

pub const RPC_HOST_ENV: &str = "RPC_HOST";
pub const RPC_PORT_ENV: &str = "RPC_PORT";
pub const GATEWAY_HOST_ENV: &str = "GATEWAY_HOST";
pub const GATEWAY_PORT_ENV: &str = "GATEWAY_PORT";
pub const DIAG_HOST_ENV: &str = "DIAG_HOST";
pub const DIAG_PORT_ENV: &str = "DIAG_PORT";

pub const RPC_KEEPALIVE_ENV: &str = "RPC_KEEPALIVE_SECS";
pub const RPC_KEEPALIVE_TIMEOUT_ENV: &str = "RPC_KEEPALIVE_TIMEOUT_SECS";

/// Where the gateway forwards translated calls. Defaults to the local RPC port.
pub const GATEWAY_UPSTREAM_ENV: &str = "GATEWAY_UPSTREAM_URL";

/// Upper bound on each listener's graceful shutdown.
pub const SHUTDOWN_GRACE_ENV: &str = "SHUTDOWN_GRACE_SECS";

/// TLS is enabled on the RPC and gateway listeners only when both are set.
pub const TLS_CERT_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_ENV: &str = "TLS_KEY_PATH";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// File name of the database inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "vault.redb";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    PartialTls,
}

/// PEM file locations for the TLS-enabled listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Token signing secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub signing_key: SigningKey,
    pub token_ttl: Duration,
    pub rpc_addr: SocketAddr,
    pub gateway_addr: SocketAddr,
    pub diag_addr: SocketAddr,
    pub rpc_keepalive_interval: Duration,
    pub rpc_keepalive_timeout: Duration,
    pub gateway_upstream: Url,
    pub shutdown_grace: Duration,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let signing_key = get(SIGNING_KEY_ENV)
            .map(|key| SigningKey(key.into_bytes()))
            .ok_or(ConfigError::Missing(SIGNING_KEY_ENV))?;

        let rpc_port: u16 = parse_or(&get, RPC_PORT_ENV, 9090)?;
        let rpc_addr = socket_addr(&get, RPC_HOST_ENV, "0.0.0.0", rpc_port)?;
        let gateway_addr = socket_addr(
            &get,
            GATEWAY_HOST_ENV,
            "0.0.0.0",
            parse_or(&get, GATEWAY_PORT_ENV, 8080)?,
        )?;
        let diag_addr = socket_addr(
            &get,
            DIAG_HOST_ENV,
            "127.0.0.1",
            parse_or(&get, DIAG_PORT_ENV, 2080)?,
        )?;

        let tls = match (get(TLS_CERT_ENV), get(TLS_KEY_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialTls),
        };

        let gateway_upstream = match get(GATEWAY_UPSTREAM_ENV) {
            Some(raw) => Url::parse(&raw).map_err(|e| invalid(GATEWAY_UPSTREAM_ENV, &raw, e))?,
            None => {
                let scheme = if tls.is_some() { "https" } else { "http" };
                let raw = format!("{scheme}://127.0.0.1:{rpc_port}");
                Url::parse(&raw).map_err(|e| invalid(GATEWAY_UPSTREAM_ENV, &raw, e))?
            }
        };

        Ok(Self {
            data_dir: get(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            signing_key,
            token_ttl: secs_or(&get, TOKEN_TTL_ENV, 3600)?,
            rpc_addr,
            gateway_addr,
            diag_addr,
            rpc_keepalive_interval: secs_or(&get, RPC_KEEPALIVE_ENV, 60)?,
            rpc_keepalive_timeout: secs_or(&get, RPC_KEEPALIVE_TIMEOUT_ENV, 20)?,
            gateway_upstream,
            shutdown_grace: secs_or(&get, SHUTDOWN_GRACE_ENV, 5)?,
            tls,
            log_format: parse_or(&get, LOG_FORMAT_ENV, LogFormat::Pretty)?,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn invalid(var: &'static str, value: &str, reason: impl fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => raw.trim().parse().map_err(|e| invalid(var, &raw, e)),
        None => Ok(default),
    }
}

fn secs_or<G>(get: &G, var: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, var, default).map(Duration::from_secs)
}

fn socket_addr<G>(
    get: &G,
    host_var: &'static str,
    default_host: &str,
    port: u16,
) -> Result<SocketAddr, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let host = get(host_var).unwrap_or_else(|| default_host.to_string());
    let ip: IpAddr = host.trim().parse().map_err(|e| invalid(host_var, &host, e))?;
    Ok(SocketAddr::new(ip, port))
}

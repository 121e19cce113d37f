// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Server Lifecycle
//!
//! Every network surface is a [`Listener`]. The [`Supervisor`] runs them all
//! under one cancellation scope:
//!
//! - each listener task holds a drop guard on the scope, so a listener that
//!   fails, panics or returns early cancels its siblings;
//! - once the scope is cancelled every listener is asked to stop and joined
//!   concurrently, each bounded by the grace period;
//! - a listener that overruns its grace is aborted, then the abort token is
//!   cancelled so in-flight store calls give up as well.
//!
//! Progress is published on a `watch` channel as [`LifecycleState`].

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use hyper_util::rt::TokioTimer;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("{listener} listener failed: {source}")]
    Serve {
        listener: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{listener} listener TLS setup failed: {source}")]
    Tls {
        listener: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{listener} listener panicked")]
    Panicked { listener: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// A network surface the supervisor can start and stop.
#[async_trait]
pub trait Listener: Send + Sync {
    fn name(&self) -> &'static str;

    /// Serve until stopped. Returning, for any reason, ends the whole server.
    async fn serve(&self) -> Result<(), ListenerError>;

    /// Begin a graceful stop. `serve` returns once draining completes.
    async fn shutdown(&self);
}

// =============================================================================
// HTTP Listener
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Http2KeepAlive {
    pub interval: Duration,
    pub timeout: Duration,
}

/// axum-server backed listener with graceful drain and optional TLS.
pub struct HttpListener {
    name: &'static str,
    addr: SocketAddr,
    router: Router,
    tls: Option<RustlsConfig>,
    keepalive: Option<Http2KeepAlive>,
    grace: Duration,
    handle: Handle<SocketAddr>,
}

impl HttpListener {
    pub fn new(name: &'static str, addr: SocketAddr, router: Router, grace: Duration) -> Self {
        Self {
            name,
            addr,
            router,
            tls: None,
            keepalive: None,
            grace,
            handle: Handle::new(),
        }
    }

    pub fn with_tls(mut self, tls: RustlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_http2_keepalive(mut self, keepalive: Http2KeepAlive) -> Self {
        self.keepalive = Some(keepalive);
        self
    }

    /// Address actually bound, once listening. `None` if binding failed.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.listening().await
    }

    fn tune<E>(&self, builder: &mut hyper_util::server::conn::auto::Builder<E>) {
        if let Some(keepalive) = self.keepalive {
            builder
                .http2()
                .timer(TokioTimer::new())
                .keep_alive_interval(keepalive.interval)
                .keep_alive_timeout(keepalive.timeout);
        }
    }
}

#[async_trait]
impl Listener for HttpListener {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn serve(&self) -> Result<(), ListenerError> {
        let app = self.router.clone().into_make_service();
        tracing::info!(
            listener = self.name,
            addr = %self.addr,
            tls = self.tls.is_some(),
            "Listener starting"
        );

        let result = match &self.tls {
            Some(tls) => {
                let mut server =
                    axum_server::bind_rustls(self.addr, tls.clone()).handle(self.handle.clone());
                self.tune(server.http_builder());
                server.serve(app).await
            }
            None => {
                let mut server = axum_server::bind(self.addr).handle(self.handle.clone());
                self.tune(server.http_builder());
                server.serve(app).await
            }
        };

        result.map_err(|source| ListenerError::Serve {
            listener: self.name,
            source,
        })
    }

    async fn shutdown(&self) {
        self.handle.graceful_shutdown(Some(self.grace));
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Slack the supervisor grants past the grace period, so a listener's own
/// forced close lands before the supervisor aborts its task.
pub const FORCED_CLOSE_MARGIN: Duration = Duration::from_millis(250);

pub struct Supervisor {
    grace: Duration,
    abort: CancellationToken,
    state: watch::Sender<LifecycleState>,
}

impl Supervisor {
    /// `abort` is cancelled after every listener has stopped or been aborted.
    pub fn new(grace: Duration, abort: CancellationToken) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            grace,
            abort,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Run `listeners` until `scope` is cancelled, then stop them all.
    ///
    /// Returns the first listener error, if any.
    pub async fn run(
        &self,
        listeners: Vec<Arc<dyn Listener>>,
        scope: CancellationToken,
    ) -> Result<(), ListenerError> {
        self.state.send_replace(LifecycleState::Starting);
        let first_error: Arc<Mutex<Option<ListenerError>>> = Arc::new(Mutex::new(None));

        let tasks: Vec<_> = listeners
            .iter()
            .map(|listener| {
                let listener = Arc::clone(listener);
                let guard = scope.clone().drop_guard();
                let first_error = Arc::clone(&first_error);
                tokio::spawn(async move {
                    let _guard = guard;
                    let name = listener.name();
                    match listener.serve().await {
                        Ok(()) => tracing::info!(listener = name, "Listener stopped"),
                        Err(e) => {
                            tracing::error!(listener = name, error = %e, "Listener failed");
                            record(&first_error, e);
                        }
                    }
                })
            })
            .collect();

        self.state.send_replace(LifecycleState::Running);
        tracing::info!(listeners = listeners.len(), "Server running");

        scope.cancelled().await;
        self.state.send_replace(LifecycleState::ShuttingDown);
        tracing::info!(grace_ms = self.grace.as_millis() as u64, "Shutting down");

        let deadline = self.grace + FORCED_CLOSE_MARGIN;
        let stops = listeners.iter().zip(tasks).map(|(listener, mut task)| {
            let first_error = Arc::clone(&first_error);
            async move {
                let name = listener.name();
                let drained = tokio::time::timeout(deadline, async {
                    listener.shutdown().await;
                    (&mut task).await
                })
                .await;

                match drained {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) if e.is_panic() => {
                        tracing::error!(listener = name, "Listener task panicked");
                        record(&first_error, ListenerError::Panicked { listener: name });
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(listener = name, error = %e, "Listener task cancelled");
                    }
                    Err(_) => {
                        tracing::warn!(listener = name, "Shutdown grace exceeded, aborting listener");
                        task.abort();
                    }
                }
            }
        });
        futures::future::join_all(stops).await;

        self.abort.cancel();
        self.state.send_replace(LifecycleState::Stopped);
        tracing::info!("Server stopped");

        let error = take(&first_error);
        error.map_or(Ok(()), Err)
    }
}

fn record(slot: &Mutex<Option<ListenerError>>, error: ListenerError) {
    let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    slot.get_or_insert(error);
}

fn take(slot: &Mutex<Option<ListenerError>>) -> Option<ListenerError> {
    let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    slot.take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    /// Listener double: serves until told to stop, optionally ignoring the request.
    struct FakeListener {
        name: &'static str,
        stop: CancellationToken,
        hang_on_shutdown: bool,
        fail_on_start: bool,
        panic_on_start: bool,
        drain: Duration,
        shutdown_called: AtomicBool,
        finished: AtomicBool,
    }

    impl FakeListener {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                stop: CancellationToken::new(),
                hang_on_shutdown: false,
                fail_on_start: false,
                panic_on_start: false,
                drain: Duration::ZERO,
                shutdown_called: AtomicBool::new(false),
                finished: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Listener for FakeListener {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn serve(&self) -> Result<(), ListenerError> {
            if self.panic_on_start {
                panic!("{} crashed", self.name);
            }
            if self.fail_on_start {
                return Err(ListenerError::Serve {
                    listener: self.name,
                    source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken"),
                });
            }
            self.stop.cancelled().await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn shutdown(&self) {
            self.shutdown_called.store(true, Ordering::SeqCst);
            if self.hang_on_shutdown {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.drain).await;
            self.stop.cancel();
        }
    }

    #[tokio::test]
    async fn hanging_listener_does_not_block_the_others() {
        let stuck = Arc::new(FakeListener {
            hang_on_shutdown: true,
            ..FakeListener::new("stuck")
        });
        let healthy = Arc::new(FakeListener::new("healthy"));
        let abort = CancellationToken::new();
        let supervisor = Supervisor::new(Duration::from_millis(100), abort.clone());
        let states = supervisor.subscribe();
        let scope = CancellationToken::new();

        let listeners: Vec<Arc<dyn Listener>> = vec![stuck.clone(), healthy.clone()];
        let trigger = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        supervisor.run(listeners, scope).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(stuck.shutdown_called.load(Ordering::SeqCst));
        assert!(healthy.stop.is_cancelled());
        assert!(abort.is_cancelled());
        assert_eq!(*states.borrow(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn failing_listener_cancels_the_scope() {
        let broken = Arc::new(FakeListener {
            fail_on_start: true,
            ..FakeListener::new("broken")
        });
        let healthy = Arc::new(FakeListener::new("healthy"));
        let supervisor = Supervisor::new(Duration::from_secs(1), CancellationToken::new());
        let scope = CancellationToken::new();

        let listeners: Vec<Arc<dyn Listener>> = vec![healthy.clone(), broken];
        let err = supervisor.run(listeners, scope.clone()).await.unwrap_err();

        assert!(matches!(err, ListenerError::Serve { listener: "broken", .. }));
        assert!(scope.is_cancelled());
        assert!(healthy.shutdown_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn drain_ending_at_the_grace_deadline_is_not_aborted() {
        let grace = Duration::from_millis(100);
        let slow = Arc::new(FakeListener {
            drain: grace + Duration::from_millis(20),
            ..FakeListener::new("slow")
        });
        let supervisor = Supervisor::new(grace, CancellationToken::new());
        let scope = CancellationToken::new();
        scope.cancel();

        let listeners: Vec<Arc<dyn Listener>> = vec![slow.clone()];
        supervisor.run(listeners, scope).await.unwrap();

        assert!(slow.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_listener_cancels_the_scope() {
        let crashing = Arc::new(FakeListener {
            panic_on_start: true,
            ..FakeListener::new("crashing")
        });
        let idle = Arc::new(FakeListener::new("idle"));
        let supervisor = Supervisor::new(Duration::from_secs(1), CancellationToken::new());
        let scope = CancellationToken::new();

        let listeners: Vec<Arc<dyn Listener>> = vec![idle.clone(), crashing];
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            supervisor.run(listeners, scope.clone()),
        )
        .await
        .expect("supervisor stops after a panic")
        .unwrap_err();

        assert!(matches!(err, ListenerError::Panicked { listener: "crashing" }));
        assert!(scope.is_cancelled());
        assert!(idle.shutdown_called.load(Ordering::SeqCst));
        assert!(idle.stop.is_cancelled());
    }

    #[tokio::test]
    async fn http_listener_serves_and_drains() {
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let listener = Arc::new(HttpListener::new(
            "test",
            "127.0.0.1:0".parse().unwrap(),
            router,
            Duration::from_secs(1),
        ));
        let supervisor = Supervisor::new(Duration::from_secs(2), CancellationToken::new());
        let scope = CancellationToken::new();

        let run = {
            let listeners: Vec<Arc<dyn Listener>> = vec![listener.clone()];
            let scope = scope.clone();
            tokio::spawn(async move { supervisor.run(listeners, scope).await })
        };

        let addr = listener.local_addr().await.expect("listening");
        let body = reqwest::get(format!("http://{addr}/ping"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "pong");

        scope.cancel();
        run.await.unwrap().unwrap();
    }
}

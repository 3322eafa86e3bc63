//! Route table and server lifecycle.
//!
//! ```text
//! Starting ──bind ok──▶ Listening ──signal / accept loop ended──▶ ShuttingDown ──▶ Stopped
//! ```
//!
//! [`Server::run`] spawns the accept loop on a background task and parks the
//! caller on [`wait_for_shutdown`]. The first trigger wins: the shared
//! [`CancellationToken`] is cancelled, the accept loop is aborted and `run`
//! returns. Open connections are not drained.

use std::net::SocketAddr;

use axum::routing::{any, MethodRouter};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument, Span};

use crate::config::ServerConfig;
use crate::error::{Result, ServiceError};
use crate::handlers::{catch_all_handler, health_handler, version_handler};
use crate::metrics::metrics_handler;
use crate::middleware::InstrumentLayer;

/// Lifecycle of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Listening,
    ShuttingDown,
    Stopped,
}

/// What ended [`wait_for_shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The cancellation token fired (accept loop ended or caller cancelled).
    Cancelled,
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

/// Root span for the whole process.
///
/// Request spans are derived from it. `addr` is recorded once the listener is bound.
pub fn root_span(version: &str) -> Span {
    info_span!("service", version = %version, addr = tracing::field::Empty)
}

/// Build the route table.
///
/// `/version`, `/healthz` and the catch-all go through [`InstrumentLayer`];
/// `/metrics` is served as-is.
pub fn build_router(root: &Span) -> Router {
    let instrumented = |route: &'static str| InstrumentLayer::new(route, root.clone());

    let catch_all: MethodRouter = any(catch_all_handler).layer(instrumented("/"));

    Router::new()
        .route("/metrics", any(metrics_handler))
        .route(
            "/version",
            any(version_handler).layer(instrumented("/version")),
        )
        .route(
            "/healthz",
            any(health_handler).layer(instrumented("/healthz")),
        )
        .fallback_service(catch_all)
}

/// A bound HTTP server, ready to run.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
    root: Span,
    state: watch::Sender<ServerState>,
}

impl Server {
    /// Bind the listener and install the route table.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Bind`] if the port cannot be bound. This is
    /// terminal; there is no retry.
    pub async fn bind(config: &ServerConfig, root: Span) -> Result<Self> {
        let (state, _) = watch::channel(ServerState::Starting);
        let addr = config.bind_addr();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServiceError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServiceError::Bind { addr, source })?;

        root.record("addr", tracing::field::display(local_addr));
        let router = build_router(&root);
        root.in_scope(|| info!("Server starting"));

        state.send_replace(ServerState::Listening);

        Ok(Self {
            listener,
            local_addr,
            router,
            root,
            state,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Serve until a shutdown trigger fires.
    ///
    /// Signal handlers are registered before the `listening` line is logged,
    /// so a signal sent after that line always takes the graceful path.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Serve`] if the accept loop ended with an I/O error.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Self {
            listener,
            local_addr,
            router,
            root,
            state,
        } = self;

        let mut signals = ShutdownSignals::register();

        let serve_token = shutdown.clone();
        let accept_loop = tokio::spawn(
            async move {
                let result = axum::serve(listener, router).await;
                match &result {
                    Ok(()) => error!("server closed"),
                    Err(e) => error!(error = %e, "error listening for server"),
                }
                serve_token.cancel();
                result
            }
            .instrument(root.clone()),
        );

        root.in_scope(|| info!(addr = %local_addr, "listening"));

        let reason = wait_for_shutdown(&shutdown, &mut signals)
            .instrument(root.clone())
            .await;

        state.send_replace(ServerState::ShuttingDown);
        shutdown.cancel();

        let outcome = if accept_loop.is_finished() {
            match accept_loop.await {
                Ok(Err(e)) => Err(ServiceError::Serve(e)),
                _ => Ok(()),
            }
        } else {
            accept_loop.abort();
            Ok(())
        };

        state.send_replace(ServerState::Stopped);
        root.in_scope(|| info!(?reason, "server stopped"));
        outcome
    }
}

// =============================================================================
// Shutdown signals
// =============================================================================

/// SIGINT / SIGTERM listeners, registered eagerly.
///
/// A listener that fails to register is logged and never fires.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: Option<tokio::signal::unix::Signal>,
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl ShutdownSignals {
    pub fn register() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::SignalKind;

            Self {
                interrupt: register_unix(SignalKind::interrupt(), "SIGINT"),
                terminate: register_unix(SignalKind::terminate(), "SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    async fn recv(&mut self) -> ShutdownReason {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = recv_or_pending(&mut self.interrupt) => ShutdownReason::Interrupt,
                _ = recv_or_pending(&mut self.terminate) => ShutdownReason::Terminate,
            }
        }
        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => ShutdownReason::Interrupt,
                Err(e) => {
                    error!(error = %e, "failed to listen for SIGINT");
                    std::future::pending().await
                }
            }
        }
    }
}

#[cfg(unix)]
fn register_unix(
    kind: tokio::signal::unix::SignalKind,
    name: &'static str,
) -> Option<tokio::signal::unix::Signal> {
    match tokio::signal::unix::signal(kind) {
        Ok(signal) => Some(signal),
        Err(e) => {
            error!(error = %e, signal = name, "failed to listen for signal");
            None
        }
    }
}

#[cfg(unix)]
async fn recv_or_pending(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => std::future::pending().await,
    }
}

/// Block until `token` is cancelled or a shutdown signal arrives.
///
/// Whichever fires first is returned; the other is no longer awaited.
pub async fn wait_for_shutdown(
    token: &CancellationToken,
    signals: &mut ShutdownSignals,
) -> ShutdownReason {
    let reason = tokio::select! {
        _ = token.cancelled() => ShutdownReason::Cancelled,
        reason = signals.recv() => reason,
    };

    match reason {
        ShutdownReason::Cancelled => info!("Context done, exiting"),
        ShutdownReason::Interrupt | ShutdownReason::Terminate => {
            info!(signal = ?reason, "Interrupt received, exiting")
        }
    }
    reason
}

//! Server lifecycle: bind, accept loop, graceful shutdown.
//!
//! ```text
//! Created → Starting → Serving → Stopping → Stopped
//! ```
//!
//! [`Server::bind`] moves through `Starting` and either fails with
//! [`ServerError::Bind`] or returns a bound server. [`Server::serve`] runs
//! the accept loop until the shutdown token is cancelled, then stops
//! accepting, lets every open connection finish its in-flight request and
//! waits up to [`ServerConfig::shutdown_timeout`] for them to close.
//!
//! Each accepted connection is served on its own task as HTTP/1.1 with
//! keep-alive. The connection's header-read timer bounds both slow request
//! heads and idle keep-alive gaps. The peer address is attached to every
//! request as [`ConnectInfo<SocketAddr>`] for the access log.

use std::{io, net::SocketAddr};

use axum::{extract::ConnectInfo, http::Request, Router};
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    server::graceful::GracefulShutdown,
};
use tokio::{net::TcpListener, sync::watch};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use crate::{config::ServerConfig, error::ServerError};

/// Observable lifecycle phase of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Starting,
    Serving,
    Stopping,
    Stopped,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        })
    }
}

/// A bound HTTP listener and the settings it serves with.
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    state: watch::Sender<ServerState>,
}

impl Server {
    /// Bind the listener described by `config`.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let (state, _) = watch::channel(ServerState::Created);
        transition(&state, ServerState::Starting);

        let addr = config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            config,
            listener,
            state,
        })
    }

    /// The address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Subscribe to lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Serve `app` until `shutdown` is cancelled.
    ///
    /// Returns `Ok(())` after a graceful stop, or [`ServerError::Accept`] if
    /// the listener fails for a reason unrelated to a single connection.
    pub async fn serve(self, app: Router, shutdown: CancellationToken) -> Result<(), ServerError> {
        let Self {
            config,
            listener,
            state,
        } = self;

        let mut http = http1::Builder::new();
        http.timer(TokioTimer::new())
            .header_read_timeout(config.header_read_timeout())
            .keep_alive(true);

        let graceful = GracefulShutdown::new();
        transition(&state, ServerState::Serving);

        let result = loop {
            let (stream, remote) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) if is_connection_error(&e) => {
                        debug!(error = %e, "accept failed, continuing");
                        continue;
                    }
                    Err(e) => break Err(ServerError::Accept(e)),
                },
                () = shutdown.cancelled() => break Ok(()),
            };

            let app = app.clone();
            let service = service_fn(move |mut req: Request<Incoming>| {
                req.extensions_mut().insert(ConnectInfo(remote));
                app.clone().oneshot(req)
            });

            let conn = graceful.watch(http.serve_connection(TokioIo::new(stream), service));
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(%remote, error = %e, "connection closed with error");
                }
            });
        };

        drop(listener);
        if let Err(e) = result {
            transition(&state, ServerState::Stopped);
            return Err(e);
        }

        transition(&state, ServerState::Stopping);
        info!(deadline = ?config.shutdown_timeout, "draining open connections");
        match tokio::time::timeout(config.shutdown_timeout, graceful.shutdown()).await {
            Ok(()) => debug!("all connections closed"),
            Err(_) => warn!(
                deadline = ?config.shutdown_timeout,
                "shutdown deadline elapsed with connections still open"
            ),
        }
        transition(&state, ServerState::Stopped);
        Ok(())
    }
}

fn transition(state: &watch::Sender<ServerState>, next: ServerState) {
    let prev = state.send_replace(next);
    debug!(from = %prev, to = %next, "server state changed");
}

/// Accept errors caused by one peer going away before it was accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

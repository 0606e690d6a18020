//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()` — no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! # Panics in handlers
//!
//! The server does not catch panics itself. An unwrapped handler that panics
//! takes its connection task down with it; wrap the handler with
//! [`Recovery`](crate::middleware::recovery::Recovery) to answer the client
//! instead.

use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::handler::{BoxHandler, Handler};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use rescue::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Starts accepting connections and dispatching every request to
    /// `handler`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, handler: impl Handler) -> Result<(), Error> {
        self.serve_with_shutdown(handler, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal`
    /// resolves instead of waiting for a process signal.
    pub async fn serve_with_shutdown(
        self,
        handler: impl Handler,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let handler = handler.into_boxed_handler();

        info!(addr = %self.addr, "rescue listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let handler = handler.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let handler = handler.clone();
                            async move { dispatch(handler, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("connection task failed: {e}");
                    }
                }
            }
        }

        // Drain: wait for every in-flight connection to finish before we return.
        while tasks.join_next().await.is_some() {}

        info!("rescue stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers the body, runs the handler, and converts the response.
///
/// The error type is [`Infallible`](std::convert::Infallible): failures are
/// answered with a status code so hyper never sees an error.
async fn dispatch(
    handler: BoxHandler,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(path = parts.uri.path(), "failed to read request body: {e}");
            return Ok(Response::status(Status::BadRequest).into_http());
        }
    };

    let response = handler.call(Request::from_parts(parts, body)).await;
    Ok(response.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Waits for Ctrl-C, or SIGTERM on Unix.
///
/// A listener that cannot be installed is logged and never fires, so the
/// other one still can.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("Ctrl-C received"),
        () = terminate => info!("SIGTERM received"),
    }
}

//! Listener, connections and the shutdown sequence
//!
//! A [`Server`] goes through four phases:
//!
//! - [`Phase::Starting`]: [`Server::bind`] binds the listener
//! - [`Phase::Serving`]: [`Server::serve`] accepts connections on a separate task
//!   and waits for either that task to fail or the shutdown future to resolve
//! - [`Phase::Draining`]: the listener is closed, connections are asked to finish
//!   their in-flight requests within [`Config::shutdown_timeout`]
//! - [`Phase::Stopped`]: everything is done, connections still alive after the
//!   deadline have been aborted

use std::{fmt, future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, extract::ConnectInfo, http::StatusCode};
use hyper::{Request, body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::{JoinError, JoinSet},
    time,
};
use tower::ServiceExt;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info, warn};

use crate::{Config, Error};

/// Lifecycle phase of a [`Server`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Binding the listener
    Starting,
    /// Accepting connections
    Serving,
    /// Listener closed, waiting for in-flight requests
    Draining,
    /// Done
    Stopped,
}

/// How the server stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// All in-flight requests finished before the deadline
    Graceful,
    /// Remaining connections were aborted after the deadline
    Forced,
}

/// Reason to shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// `SIGINT`, or Ctrl+C
    Interrupt,
    /// `SIGTERM`
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminated",
        })
    }
}

/// Resolves on the first `SIGINT` or `SIGTERM`
///
/// A signal handler that can't be installed is logged and never fires.
pub async fn shutdown_signal() -> Signal {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Signal::Interrupt,
            Err(err) => {
                error!(%err, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                Signal::Terminate
            }
            Err(err) => {
                error!(%err, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Signal>();

    tokio::select! {
        signal = interrupt => signal,
        signal = terminate => signal,
    }
}

/// A bound HTTP/1.1 server
#[derive(Debug)]
pub struct Server {
    config: Config,
    listener: TcpListener,
}

impl Server {
    /// Binds the listener to [`Config::addr`]
    ///
    /// # Errors
    ///
    /// Fails if the address can't be bound, e.g. when the port is already taken.
    pub async fn bind(config: Config) -> Result<Self, Error> {
        debug!(phase = ?Phase::Starting, addr = %config.addr);
        let listener = TcpListener::bind(config.addr)
            .await
            .map_err(|source| Error::Bind {
                addr: config.addr,
                source,
            })?;
        Ok(Self { config, listener })
    }

    /// Address the listener is actually bound to
    ///
    /// # Errors
    ///
    /// Passes through the OS error.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves `router` until `shutdown` resolves, then drains
    ///
    /// Every request gets [`ConnectInfo<SocketAddr>`] of its connection.
    ///
    /// # Errors
    ///
    /// Fails if the listener stops on its own, or if connections can't be closed
    /// after the drain deadline.
    pub async fn serve<F>(self, router: Router, shutdown: F) -> Result<Outcome, Error>
    where
        F: Future<Output = Signal>,
    {
        let Self { config, listener } = self;
        let router = router.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.write_timeout,
        ));
        let (stop_tx, stop_rx) = watch::channel(false);

        match listener.local_addr() {
            Ok(addr) => info!(phase = ?Phase::Serving, %addr, "SimpleTimeService listening"),
            Err(err) => warn!(phase = ?Phase::Serving, %err, "SimpleTimeService listening"),
        }
        let mut acceptor = tokio::spawn(accept(
            listener,
            router,
            ConnectionTimeouts::from(&config),
            stop_rx,
        ));

        let signal = tokio::select! {
            res = &mut acceptor => {
                return Err(match res {
                    Ok(Ok(_)) => Error::Listener(io::Error::other("listener stopped unexpectedly")),
                    Ok(Err(err)) => Error::Listener(err),
                    Err(err) => Error::ListenerTask(err),
                });
            }
            signal = shutdown => signal,
        };

        info!(phase = ?Phase::Draining, %signal, "Received signal, starting shutdown");
        let deadline = time::Instant::now() + config.shutdown_timeout;
        stop_tx.send_replace(true);
        let mut connections = match acceptor.await {
            Ok(Ok(connections)) => connections,
            Ok(Err(err)) => return Err(Error::Listener(err)),
            Err(err) => return Err(Error::ListenerTask(err)),
        };

        match time::timeout_at(deadline, connections.drain()).await {
            Ok(Ok(())) => {
                info!(phase = ?Phase::Stopped, "Server stopped gracefully");
                return Ok(Outcome::Graceful);
            }
            Ok(Err(err)) => error!(%err, "Error during shutdown"),
            Err(_) => warn!(
                timeout = ?config.shutdown_timeout,
                "In-flight requests didn't finish in time"
            ),
        }

        let closed = connections.force_close().await?;
        warn!(phase = ?Phase::Stopped, closed, "Server stopped, connections closed forcibly");
        Ok(Outcome::Forced)
    }
}

#[derive(Debug, Clone, Copy)]
struct ConnectionTimeouts {
    read: Duration,
    idle: Duration,
}

impl From<&Config> for ConnectionTimeouts {
    fn from(config: &Config) -> Self {
        Self {
            read: config.read_timeout,
            idle: config.idle_timeout,
        }
    }
}

/// Tasks serving accepted connections
#[derive(Default)]
struct Connections(JoinSet<()>);

impl Connections {
    /// Waits for every connection to finish on its own
    async fn drain(&mut self) -> Result<(), JoinError> {
        while let Some(res) = self.0.join_next().await {
            res?;
        }
        Ok(())
    }

    /// Aborts every connection, returns how many were still alive
    async fn force_close(&mut self) -> Result<usize, Error> {
        self.0.abort_all();
        let mut closed = 0;
        while let Some(res) = self.0.join_next().await {
            match res {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => closed += 1,
                Err(err) => return Err(Error::ForceClose(err)),
            }
        }
        Ok(closed)
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Accepts connections until `stop` flips, then hands the live ones over
async fn accept(
    listener: TcpListener,
    router: Router,
    timeouts: ConnectionTimeouts,
    mut stop: watch::Receiver<bool>,
) -> io::Result<Connections> {
    let mut connections = Connections::default();
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            Some(res) = connections.0.join_next(), if !connections.0.is_empty() => {
                if let Err(err) = res {
                    error!(%err, "Connection task failed");
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.0.spawn(serve_connection(
                        stream,
                        peer,
                        router.clone(),
                        timeouts,
                        stop.clone(),
                    ));
                }
                Err(err) if is_transient(&err) => debug!(%err, "Accept failed"),
                Err(err) => return Err(err),
            },
        }
    }
    debug!("Listener closed");
    Ok(connections)
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    timeouts: ConnectionTimeouts,
    mut stop: watch::Receiver<bool>,
) {
    // number of requests in flight on this connection
    let (in_flight_tx, mut in_flight) = watch::channel(0_usize);
    let in_flight_tx = Arc::new(in_flight_tx);

    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        let router = router.clone();
        let counter = Arc::clone(&in_flight_tx);
        async move {
            counter.send_modify(|n| *n += 1);
            let response = router.oneshot(request).await;
            counter.send_modify(|n| *n -= 1);
            response
        }
    });

    let mut builder = http1::Builder::new();
    builder.timer(TokioTimer::new()).header_read_timeout(timeouts.read);
    let mut conn = std::pin::pin!(builder.serve_connection(TokioIo::new(stream), service));

    let mut closing = *stop.borrow_and_update();
    if closing {
        conn.as_mut().graceful_shutdown();
    }

    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(err) = res {
                    debug!(%peer, %err, "Connection error");
                }
                break;
            }
            _ = stop.changed(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            idle = time::timeout(timeouts.idle, in_flight.changed()), if !closing => {
                if idle.is_err() && *in_flight.borrow() == 0 {
                    debug!(%peer, "Closing idle connection");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }
}

//! Request logging

use std::{net::SocketAddr, time::Instant};

use axum::{
    extract::{ConnectInfo, Request},
    http::{Method, Uri},
    middleware::Next,
    response::Response,
};
use tracing::info;

/// Logs method, URI, peer address and duration of every request
///
/// Use with [`axum::middleware::from_fn`]. The response passes through untouched.
/// The line is written when the request is done, including when the handler is
/// cut off by a timeout or its connection is aborted.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let _log = RequestLog::new(&request);
    next.run(request).await
}

/// Writes the request line on drop
struct RequestLog {
    method: Method,
    uri: Uri,
    peer: String,
    start: Instant,
}

impl RequestLog {
    fn new(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            peer: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map_or_else(|| "-".to_owned(), |ConnectInfo(addr)| addr.to_string()),
            start: Instant::now(),
        }
    }
}

impl Drop for RequestLog {
    fn drop(&mut self) {
        info!(
            method = %self.method,
            uri = %self.uri,
            peer = %self.peer,
            elapsed = ?self.start.elapsed(),
            "finished request"
        );
    }
}

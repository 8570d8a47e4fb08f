//! Client IP resolution
//!
//! The IP is looked up, in order, in:
//!
//! - the leftmost entry of the `X-Forwarded-For` header
//! - the `X-Real-Ip` header
//! - the peer address of the connection, with the trailing `:port` stripped
//!
//! Header values are trusted verbatim, they aren't validated to be IPs. Use it for
//! display purposes only, never for anything security related.

use std::{fmt, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};

pub(crate) const X_FORWARDED_FOR: &str = "X-Forwarded-For";
pub(crate) const X_REAL_IP: &str = "X-Real-Ip";

/// Resolves the client IP from request headers and the peer address string
///
/// The result is only empty if the peer address is empty or the leftmost
/// `X-Forwarded-For` entry is blank.
pub fn resolve(headers: &HeaderMap, peer: &str) -> String {
    leftmost_forwarded_for(headers)
        .or_else(|| real_ip(headers))
        .unwrap_or_else(|| strip_port(peer))
        .to_owned()
}

/// Truncates an address at its last colon
///
/// Meant for `ip:port` strings. A bare IPv6 address loses its last group, e.g.
/// `2001:db8::1` turns into `2001:db8:`.
pub fn strip_port(addr: &str) -> &str {
    addr.rfind(':').map_or(addr, |idx| &addr[..idx])
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|hv| hv.to_str().ok())
        .filter(|s| !s.is_empty())
}

fn leftmost_forwarded_for(headers: &HeaderMap) -> Option<&str> {
    header(headers, X_FORWARDED_FOR)
        .and_then(|s| s.split(',').next())
        .map(str::trim)
}

fn real_ip(headers: &HeaderMap) -> Option<&str> {
    header(headers, X_REAL_IP)
}

/// Extractor for the client IP, see [`resolve`]
///
/// It needs [`axum::extract::ConnectInfo`] for the peer address and rejects with a
/// 500 error without it, even if one of the headers is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = MissingConnectInfo;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ConnectInfo(peer) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(|_| MissingConnectInfo)?;
        Ok(Self(resolve(&parts.headers, &peer.to_string())))
    }
}

/// Rejection of [`ClientIp`] when the peer address is unknown, answered with a 500
#[derive(Debug, Clone, Copy)]
pub struct MissingConnectInfo;

impl IntoResponse for MissingConnectInfo {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

impl fmt::Display for MissingConnectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Can't extract `ClientIp`, provide `axum::extract::ConnectInfo`")
    }
}

impl std::error::Error for MissingConnectInfo {}

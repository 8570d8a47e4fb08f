//! JSON bodies of the two endpoints

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::error;

/// Body of the root endpoint
#[derive(Debug, Clone, Serialize)]
pub struct TimeRecord {
    /// RFC 3339 UTC timestamp with nanoseconds, e.g. `2024-05-01T12:00:00.123456789Z`
    pub timestamp: String,
    /// Resolved client IP
    pub ip: String,
}

impl TimeRecord {
    /// Stamps the given IP with the current time
    pub fn now(ip: String) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            ip,
        }
    }
}

/// Body of the liveness probe
#[derive(Debug, Clone, Serialize)]
pub struct HealthRecord {
    /// Always `healthy`
    pub status: &'static str,
}

impl HealthRecord {
    /// The only health record there is
    pub const fn healthy() -> Self {
        Self { status: "healthy" }
    }
}

/// Serializes `value` into a `200 application/json` response
///
/// Falls back to a plain-text 500 if serialization fails.
pub fn json<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(%err, "Error encoding response");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

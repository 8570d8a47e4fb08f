//! Routes and their handlers

use axum::{
    Router,
    http::{HeaderMap, header::USER_AGENT},
    middleware,
    response::Response,
    routing::any,
};
use tracing::info;

use crate::{
    client_ip::ClientIp,
    middleware::log_requests,
    response::{HealthRecord, TimeRecord, json},
};

/// Current time and the caller's IP
///
/// Serves every method and every path without a dedicated route.
pub async fn root(ClientIp(ip): ClientIp, headers: HeaderMap) -> Response {
    let record = TimeRecord::now(ip);
    let response = json(&record);
    if response.status().is_success() {
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|hv| hv.to_str().ok())
            .unwrap_or_default();
        info!(ip = %record.ip, ?user_agent, "client request");
    }
    response
}

/// Liveness probe
pub async fn health() -> Response {
    json(&HealthRecord::healthy())
}

/// All the routes wrapped into the request logger
///
/// The peer address comes from [`axum::extract::ConnectInfo`], [`crate::Server`]
/// provides it for every request.
pub fn router() -> Router {
    Router::new()
        .route("/health", any(health))
        .fallback(root)
        .layer(middleware::from_fn(log_requests))
}

#[cfg(test)]
mod tests {
    use super::router;
    use crate::test_log::capture;
    use axum::{
        Router,
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use chrono::DateTime;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn app() -> Router {
        router().layer(MockConnectInfo(SocketAddr::from(([192, 0, 2, 1], 12345))))
    }

    async fn body_json(res: Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_direct_connection() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");

        let body = body_json(res).await;
        assert_eq!(body["ip"], "192.0.2.1");
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(timestamp.contains('.'));
        assert_eq!(body.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn root_behind_proxy() {
        let req = Request::builder()
            .uri("/")
            .header("X-Forwarded-For", "203.0.113.42, 198.51.100.23, 192.0.2.1")
            .header("X-Real-Ip", "198.51.100.99")
            .header("User-Agent", "curl/8.0")
            .body(Body::empty())
            .unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(body_json(res).await["ip"], "203.0.113.42");

        let req = Request::builder()
            .uri("/")
            .header("X-Real-IP", "198.51.100.23")
            .body(Body::empty())
            .unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(body_json(res).await["ip"], "198.51.100.23");
    }

    #[tokio::test]
    async fn root_is_the_fallback() {
        for (method, uri) in [
            (Method::POST, "/"),
            (Method::GET, "/whatever"),
            (Method::DELETE, "/health/nested"),
        ] {
            let req = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let res = app().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(body_json(res).await["ip"], "192.0.2.1");
        }
    }

    #[tokio::test]
    async fn health() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#"{"status":"healthy"}"#);
    }

    #[tokio::test]
    async fn health_any_method() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(body_json(res).await["status"], "healthy");
    }

    #[tokio::test]
    async fn root_logs_ip_and_user_agent() {
        let (logs, _guard) = capture();

        let req = Request::builder()
            .uri("/")
            .header("X-Real-Ip", "198.51.100.23")
            .header("User-Agent", "curl/8.0")
            .body(Body::empty())
            .unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let lines = logs.lines_with("client request");
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[0].contains("ip=198.51.100.23"), "{}", lines[0]);
        assert!(lines[0].contains(r#"user_agent="curl/8.0""#), "{}", lines[0]);
        assert!(lines[1].contains("ip=192.0.2.1"), "{}", lines[1]);
        assert!(lines[1].contains(r#"user_agent="""#), "{}", lines[1]);

        // the request logger covers every route
        assert_eq!(logs.lines_with("finished request").len(), 2);
    }

    #[tokio::test]
    async fn health_logs_only_the_request_line() {
        let (logs, _guard) = capture();

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        assert!(logs.lines_with("client request").is_empty());
        let lines = logs.lines_with("finished request");
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("uri=/health"), "{}", lines[0]);
    }
}

//! Admission middleware.

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, trace};

use super::error::ApiError;
use crate::error::{Result, TollgateError};
use crate::ratelimit::{ClientKey, ClientRateLimiter};

/// Admit or reject a request based on its client's token bucket.
///
/// Requests pass straight through when limiting is disabled. Otherwise the
/// client is identified by the host of its peer address; a request without
/// one means the server was not started with connect info and is answered
/// with a 500 rather than being admitted or denied.
pub async fn rate_limit(
    State(limiter): State<Arc<ClientRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let key = match client_key(&request) {
        Ok(key) => key,
        Err(e) => {
            error!(
                error = %e,
                request_method = %request.method(),
                request_url = %request.uri(),
                "Failed to identify client"
            );
            return ApiError::ServerError.into_response();
        }
    };

    if !limiter.admit(&key) {
        return ApiError::RateLimitExceeded.into_response();
    }

    trace!(client = %key, "Request admitted");
    next.run(request).await
}

/// Derive the client key from the connection's peer address.
fn client_key(request: &Request) -> Result<ClientKey> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| ClientKey::from(addr))
        .ok_or_else(|| {
            TollgateError::ClientIdentification("request carries no peer address".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimiterConfig;
    use crate::http::{create_router, AppState};
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(config: LimiterConfig) -> (Router, Arc<ClientRateLimiter>) {
        let limiter = Arc::new(ClientRateLimiter::start(&config).unwrap());
        let state = AppState::new(limiter.clone(), "testing");
        (create_router(state, Duration::from_secs(30)), limiter)
    }

    fn limited(burst: u32, requests_per_second: f64) -> LimiterConfig {
        LimiterConfig {
            burst,
            requests_per_second,
            ..Default::default()
        }
    }

    fn request(uri: &str, peer: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            builder = builder.extension(ConnectInfo(addr));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_rate_limited() {
        let (app, limiter) = app(limited(4, 2.0));

        for _ in 0..4 {
            let (status, _) = send(&app, request("/v1/healthcheck", Some("10.0.0.1:5000"))).await;
            assert_eq!(status, StatusCode::OK);
        }
        for _ in 0..2 {
            let (status, body) =
                send(&app, request("/v1/healthcheck", Some("10.0.0.1:5000"))).await;
            assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(body, json!({ "error": "rate limit exceeded" }));
        }

        tokio::time::advance(Duration::from_secs(1)).await;
        let statuses = [
            send(&app, request("/v1/healthcheck", Some("10.0.0.1:5001"))).await.0,
            send(&app, request("/v1/healthcheck", Some("10.0.0.1:5002"))).await.0,
            send(&app, request("/v1/healthcheck", Some("10.0.0.1:5003"))).await.0,
        ];
        assert_eq!(
            statuses,
            [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_clients_limited_independently() {
        let (app, limiter) = app(limited(1, 0.001));

        let (status, _) = send(&app, request("/v1/healthcheck", Some("10.0.0.1:80"))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, request("/v1/healthcheck", Some("10.0.0.1:80"))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _) = send(&app, request("/v1/healthcheck", Some("10.0.0.2:80"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_peer_address_is_server_error() {
        let (app, limiter) = app(limited(4, 2.0));

        let (status, body) = send(&app, request("/v1/healthcheck", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "error": "the server encountered a problem and could not process your request" })
        );
        assert_eq!(limiter.tracked_clients(), 0);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_forwards_everything() {
        let (app, limiter) = app(LimiterConfig {
            enabled: false,
            ..limited(1, 0.0)
        });

        for _ in 0..20 {
            let (status, _) = send(&app, request("/v1/healthcheck", Some("10.0.0.1:80"))).await;
            assert_eq!(status, StatusCode::OK);
        }
        // Identification is skipped entirely when disabled.
        let (status, _) = send(&app, request("/v1/healthcheck", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn test_fallbacks_are_limited_too() {
        let (app, limiter) = app(limited(1, 0.001));

        let (status, body) = send(&app, request("/nowhere", Some("10.0.0.1:80"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "the requested resource could not be found" }));

        let (status, _) = send(&app, request("/nowhere", Some("10.0.0.1:80"))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let (app, limiter) = app(limited(4, 2.0));

        let mut req = request("/v1/healthcheck", Some("10.0.0.1:80"));
        *req.method_mut() = Method::DELETE;
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            body,
            json!({ "error": "the DELETE method is not supported for this resource" })
        );

        limiter.shutdown().await;
    }
}

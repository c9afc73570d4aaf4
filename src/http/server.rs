//! HTTP server implementation.

use axum::error_handling::HandleErrorLayer;
use axum::http::{header, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Router};
use std::any::Any;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info, warn};

use super::error::ApiError;
use super::health::healthcheck;
use super::middleware::rate_limit;
use crate::config::ServerConfig;
use crate::error::{Result, TollgateError};
use crate::ratelimit::ClientRateLimiter;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The admission limiter
    pub limiter: Arc<ClientRateLimiter>,
    /// Deployment environment name
    pub env: Arc<str>,
}

impl AppState {
    /// Bundle the limiter with the environment name reported by the health check.
    pub fn new(limiter: Arc<ClientRateLimiter>, env: &str) -> Self {
        Self {
            limiter,
            env: Arc::from(env),
        }
    }
}

/// Build the router with every route behind the admission middleware.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let routes = Router::new().route("/v1/healthcheck", get(healthcheck));
    with_layers(routes, state, request_timeout)
}

/// Wrap `routes` in the middleware stack, outermost first:
/// panic recovery → request timeout → admission → handlers.
fn with_layers(routes: Router<AppState>, state: AppState, request_timeout: Duration) -> Router {
    routes
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|err: tower::BoxError| async move {
                    if err.is::<tower::timeout::error::Elapsed>() {
                        ApiError::RequestTimeout
                    } else {
                        error!(error = %err, "Unhandled middleware error");
                        ApiError::ServerError
                    }
                }))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}

/// Turn a panic below the router into a 500 and close the connection.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else {
        "non-string panic payload"
    };
    error!(panic = %detail, "Request handler panicked");

    let mut response = ApiError::ServerError.into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// HTTP server fronted by the client rate limiter.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Handler state
    state: AppState,
    request_timeout: Duration,
    shutdown_timeout: Duration,
}

impl HttpServer {
    /// Create a new server from its configuration section.
    pub fn new(config: &ServerConfig, limiter: Arc<ClientRateLimiter>) -> Self {
        Self {
            addr: config.addr,
            state: AppState::new(limiter, &config.env),
            request_timeout: config.request_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    ///
    /// The limiter's reaper is stopped as soon as the signal fires. Open
    /// connections then get the shutdown timeout to finish; whatever is
    /// still open after that is abandoned and this returns anyway.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let limiter = self.state.limiter.clone();
        let shutdown_timeout = self.shutdown_timeout;
        let app = create_router(self.state, self.request_timeout);

        info!(
            addr = %local_addr,
            rate_limiting = limiter.is_enabled(),
            "Starting HTTP server with graceful shutdown"
        );

        let draining = CancellationToken::new();
        let graceful = {
            let limiter = limiter.clone();
            let draining = draining.clone();
            async move {
                signal.await;
                info!("Shutdown signal received, draining connections");
                limiter.shutdown().await;
                draining.cancel();
            }
        };

        let serve = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(graceful)
        .into_future();
        tokio::pin!(serve);

        let served = tokio::select! {
            served = &mut serve => served,
            _ = draining.cancelled() => {
                match tokio::time::timeout(shutdown_timeout, &mut serve).await {
                    Ok(served) => served,
                    Err(_) => {
                        warn!(
                            timeout_secs = shutdown_timeout.as_secs_f64(),
                            "Graceful drain timed out, abandoning open connections"
                        );
                        Ok(())
                    }
                }
            }
        };

        // Also covers a serve error before any signal arrived.
        limiter.shutdown().await;
        info!(addr = %local_addr, "HTTP server stopped");

        served.map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TollgateError::Io(e)
        })
    }
}

//! HTTP adapters - REST API implementations.

pub mod billing;

use std::time::Duration;

use axum::http::Request;
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use billing::{billing_router, BillingAppState};

/// Full application router with request tracing and a request timeout.
pub fn app_router(state: BillingAppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", axum::routing::get(|| async { "ok" }))
        .merge(billing_router())
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %Uuid::new_v4()
                )
            }),
        )
}

//! Router assembly.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::handlers::{detect, health, index, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    ClientRateLimiter,
};
use crate::state::AppState;

/// Build the full application router.
///
/// Only the detection routes are rate limited. `/metrics` is mounted only when
/// a Prometheus handle is supplied.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let config = state.config.clone();
    let limiter = Arc::new(ClientRateLimiter::new(
        config.rate_limit_rps,
        config.rate_limit_burst,
    ));

    let detection = Router::new()
        .route("/detect", post(detect))
        .route("/predict", post(detect))
        .route_layer(from_fn_with_state(limiter, rate_limit_middleware));

    let mut router = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready))
        .nest("/api", detection);

    if let Some(handle) = metrics_handle {
        router = router.route("/metrics", get(move || std::future::ready(handle.render())));
    }

    // Outermost layer last
    router
        // Enforced while reading multipart fields, so oversize uploads get the JSON 413
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers))
        .layer(from_fn(request_id))
        .layer(from_fn(request_logging))
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}

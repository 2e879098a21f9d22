//! HTTP-level Prometheus metrics.
//!
//! Detection metrics live in `presence_vision::metrics` and share the recorder
//! installed here.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "presence_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "presence_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "presence_http_requests_in_flight";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "presence_rate_limit_hits_total";
}

const KNOWN_ROUTES: &[&str] = &[
    "/",
    "/api/detect",
    "/api/predict",
    "/health",
    "/healthz",
    "/ready",
    "/metrics",
];

/// Install the process-wide recorder. Fails if one is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Route label; anything unrouted is folded into `other`.
fn route_label(path: &str) -> &'static str {
    KNOWN_ROUTES
        .iter()
        .copied()
        .find(|route| *route == path)
        .unwrap_or("other")
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_owned()),
        ("path", route_label(path).to_owned()),
        ("status", status.to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_rate_limit_hit(path: &str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "endpoint" => route_label(path)).increment(1);
}

/// Count, time and track in-flight requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().as_str().to_owned();
    let path = request.uri().path().to_owned();

    let in_flight = gauge!(names::HTTP_REQUESTS_IN_FLIGHT);
    in_flight.increment(1.0);
    let started = Instant::now();

    let response = next.run(request).await;

    in_flight.decrement(1.0);
    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

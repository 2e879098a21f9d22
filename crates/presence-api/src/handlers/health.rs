//! Liveness and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use presence_vision::BackendAvailability;
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Always 200 while the process is serving.
pub async fn health() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub backend: BackendCheck,
}

#[derive(Serialize)]
pub struct BackendCheck {
    pub name: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// Public text for a backend that failed to load. The reason stays in the logs.
pub const BACKEND_NOT_LOADED: &str = "Detection backend failed to load.";

/// 200 when the detection backend loaded at startup, 503 otherwise.
///
/// Availability is fixed at startup, so a 503 here never clears without a restart.
pub async fn ready(State(state): State<AppState>) -> Response {
    let backend = state.detector.backend();

    let (code, status, check) = match backend.availability() {
        BackendAvailability::Ready => (StatusCode::OK, "ready", ("ok", None)),
        BackendAvailability::Unavailable { reason } => {
            warn!(backend = backend.kind().as_str(), %reason, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable", ("error", Some(BACKEND_NOT_LOADED)))
        }
    };

    let body = Readiness {
        status,
        checks: ReadinessChecks {
            backend: BackendCheck {
                name: backend.kind().as_str(),
                status: check.0,
                error: check.1,
            },
        },
    };

    (code, Json(body)).into_response()
}

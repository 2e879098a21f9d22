//! HTTP front end for presence detection.
//!
//! `POST /api/detect` takes a multipart `image` field and answers with the
//! canonical detection JSON. `/ready` reports whether the configured backend
//! loaded. Everything else is plumbing around [`presence_vision::DetectionService`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

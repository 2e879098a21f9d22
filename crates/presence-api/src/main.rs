//! presence-api binary.

use std::net::SocketAddr;

use anyhow::Context;
use presence_api::{create_router, metrics, ApiConfig, AppState};
use presence_vision::{BackendAvailability, DetectionSettings};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let config = ApiConfig::from_env();
    let settings = DetectionSettings::from_env();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %settings.backend,
        target_class = settings.target_class(),
        max_concurrency = settings.max_concurrency,
        "Starting presence-api"
    );

    // Recorder must exist before the backend loads or its startup counters are lost
    let metrics_handle = config
        .metrics_enabled
        .then(metrics::init_metrics)
        .and_then(|installed| {
            installed
                .map_err(|e| warn!(error = %e, "Prometheus recorder not installed"))
                .ok()
        });

    let state = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || AppState::from_settings(config, settings))
            .await
            .context("Backend loader panicked")?
    };

    match state.detector.availability() {
        BackendAvailability::Ready => info!("Detection backend ready"),
        BackendAvailability::Unavailable { reason } => {
            error!(%reason, "Detection backend unavailable; detect requests will get 503")
        }
    }

    let addr = config
        .bind_addr()
        .with_context(|| format!("Bad HOST/PORT {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Cannot bind {}", addr))?;
    info!(%addr, metrics = metrics_handle.is_some(), "Listening");

    let app = create_router(state, metrics_handle);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server terminated with error")?;

    info!("Stopped");
    Ok(())
}

/// `LOG_FORMAT=json` for machine-readable logs, human-readable otherwise.
fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("presence=info".parse()?);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received, draining connections");
}

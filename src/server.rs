//! # Webhook Listener
//!
//! HTTP server that lets webhook and scheduler callers trigger the same
//! sync entry point the CLI uses.
//!
//! Provides endpoints:
//! - `POST /v1/sync` - Run a sync (optional environment/platform/dry-run in the body)
//! - `GET /healthz` - Liveness probe (always returns 200)
//! - `GET /metrics` - Prometheus metrics in text format

use crate::config::Settings;
use crate::report::exit_code;
use crate::sync::{all_succeeded, run_sync, SyncOptions, SyncOutcome};
use crate::{metrics, report};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub struct ListenerState {
    pub settings: Settings,
}

impl std::fmt::Debug for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerState")
            .field("project", &self.settings.project)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SyncRequest {
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    success: bool,
    finished_at: DateTime<Utc>,
    outcomes: Vec<SyncOutcome>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn serve(settings: Settings, port: u16) -> Result<(), anyhow::Error> {
    if let Err(e) = metrics::register_metrics() {
        warn!("Failed to register metrics: {}", e);
    }

    let state = Arc::new(ListenerState { settings });
    let app = Router::new()
        .route("/v1/sync", post(sync_handler))
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("Webhook listener on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn sync_handler(
    State(state): State<Arc<ListenerState>>,
    Json(request): Json<SyncRequest>,
) -> impl IntoResponse {
    let provider = match state.settings.build_provider() {
        Ok(provider) => provider,
        Err(err) => {
            error!("Sync rejected: {}", err);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err);
        }
    };
    let platforms = match state.settings.build_platforms() {
        Ok(platforms) => platforms,
        Err(err) => {
            error!("Sync rejected: {}", err);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err);
        }
    };

    let options = SyncOptions {
        environment: state
            .settings
            .resolve_environment(request.environment.as_deref()),
        dry_run: request.dry_run,
        platform_filter: request.platform,
    };

    info!(
        "Webhook-triggered sync for environment {} (dry_run={})",
        options.environment, options.dry_run
    );

    match run_sync(&provider, &platforms, &options).await {
        Ok(outcomes) => {
            let response = SyncResponse {
                success: all_succeeded(&outcomes),
                finished_at: Utc::now(),
                outcomes,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            error!("Sync aborted: {}", err);
            let status = match report::exit_code_for_store_error(&err) {
                code if code == exit_code::CONFIG => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_GATEWAY,
            };
            error_response(status, &err)
        }
    }
}

fn error_response(status: StatusCode, err: &impl std::fmt::Display) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = metrics::REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

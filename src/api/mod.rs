pub mod dto;
pub mod errors;
pub mod handlers;

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    bridge::RealtimeBridge,
    ingest::IngestService,
    scan::{ScanCoordinator, ScanStatusStore},
    sensor::SensorSource,
    snapshot::LiveSnapshot,
};

use handlers::ApiDoc;

/// Everything the handlers need, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub snapshot: LiveSnapshot,
    pub bridge: RealtimeBridge,
    pub ingest: IngestService,
    pub coordinator: ScanCoordinator,
    pub source: SensorSource,
    pub scan_status: ScanStatusStore,
    pub offline_threshold: Duration,
    pub cron_user_id: Option<Uuid>,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/data",
            get(handlers::get_live_data).post(handlers::ingest_reading),
        )
        .route("/upload", post(handlers::ingest_reading))
        .route("/readings", get(handlers::get_readings))
        .route("/readings/latest", get(handlers::get_latest_reading))
        .route("/scan/status", get(handlers::get_scan_status))
        .route("/scan/start", post(handlers::start_scan))
        .route("/scan/stop", post(handlers::stop_scan))
        .route("/scan/save", post(handlers::save_now))
        .route("/cron/scan", post(handlers::cron_scan))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}

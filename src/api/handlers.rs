use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_stream::StreamExt;
use utoipa::OpenApi;
use uuid::Uuid;

use super::{
    dto::{
        DeviceStatus, LiveDataResponse, ReadingDto, ScanControlResponse, ScanStatusDto,
        StartScanRequest, UploadResponse,
    },
    errors::AppError,
    AppState,
};
use crate::{
    db::models::Reading,
    ingest::IngestError,
    scan::ScanOutcome,
    sensor::{payload::SensorPayload, FetchOutcome},
};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TimeRangeParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Acting user, as asserted by the auth layer in front of this service.
/// A malformed id is treated the same as a missing one downstream.
fn user_from_headers(headers: &HeaderMap) -> Result<Option<Uuid>, AppError> {
    match headers.get("x-user-id") {
        None => Ok(None),
        Some(value) => {
            let raw = value.to_str().map_err(|_| AppError::Unauthorized)?;
            raw.parse().map(Some).map_err(|_| AppError::Unauthorized)
        }
    }
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Live data
// ---------------------------------------------------------------------------

/// Latest pushed reading. With `Accept: text/event-stream` this instead
/// opens a push stream: the current snapshot immediately, then one frame
/// per subsequent ingest.
#[utoipa::path(
    get,
    path = "/data",
    responses(
        (status = 200, description = "Latest reading and device freshness", body = LiveDataResponse),
    ),
    tag = "data"
)]
pub async fn get_live_data(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if wants_event_stream(&headers) {
        let subscription = state.bridge.subscribe_readings();
        let current = state
            .snapshot
            .current()
            .await
            .map(|snap| snap.payload)
            .unwrap_or_default();

        let first = Event::default().json_data(&current);
        let stream = tokio_stream::once(first)
            .chain(subscription.map(|payload| Event::default().json_data(&payload)));

        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response());
    }

    let snapshot = state.snapshot.current().await;
    let fresh = state.snapshot.is_fresh(state.offline_threshold).await;

    let response = match snapshot {
        Some(snap) => LiveDataResponse {
            status: if fresh { DeviceStatus::Online } else { DeviceStatus::Offline },
            data: Some(snap.payload),
            last_updated: Some(snap.received_at),
        },
        None => LiveDataResponse {
            status: DeviceStatus::Offline,
            data: None,
            last_updated: None,
        },
    };
    Ok(Json(response).into_response())
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// Accept a pushed reading from the device or a proxy acting for it.
/// Any subset of the four fields is accepted, numeric or string-encoded;
/// a payload with no usable values is rejected without a write.
#[utoipa::path(
    post,
    path = "/data",
    request_body = SensorPayload,
    responses(
        (status = 200, description = "Reading persisted", body = UploadResponse),
        (status = 400, description = "Empty or value-free payload"),
    ),
    tag = "data"
)]
pub async fn ingest_reading(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<UploadResponse>, AppError> {
    let payload = SensorPayload::from_json(&body);
    let reading = state.ingest.push(payload).await?;
    let latest = SensorPayload::from(&reading);

    Ok(Json(UploadResponse {
        success: true,
        message: format!("Data received at {}", reading.created_at.to_rfc3339()),
        outcome: ScanOutcome::Saved,
        latest_data: latest,
    }))
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Readings in a time range, oldest first. Both bounds optional
/// (`?from=<RFC3339>&to=<RFC3339>`, inclusive).
#[utoipa::path(
    get,
    path = "/readings",
    params(
        ("from" = Option<DateTime<Utc>>, Query, description = "Start of time range (RFC3339)"),
        ("to"   = Option<DateTime<Utc>>, Query, description = "End of time range (RFC3339)"),
    ),
    responses(
        (status = 200, description = "Readings ordered by created_at ASC", body = Vec<ReadingDto>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "data"
)]
pub async fn get_readings(
    State(state): State<AppState>,
    Query(params): Query<TimeRangeParams>,
) -> Result<Json<Vec<ReadingDto>>, AppError> {
    let rows = sqlx::query_as::<_, Reading>(
        "SELECT id, user_id, ph, turbidity, temperature, tds, created_at \
         FROM dataset_history \
         WHERE ($1::timestamptz IS NULL OR created_at >= $1) \
           AND ($2::timestamptz IS NULL OR created_at <= $2) \
         ORDER BY created_at ASC",
    )
    .bind(params.from)
    .bind(params.to)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// The single most recent persisted reading, if any.
#[utoipa::path(
    get,
    path = "/readings/latest",
    responses(
        (status = 200, description = "Most recent reading, null when none exists", body = ReadingDto),
        (status = 500, description = "Internal server error"),
    ),
    tag = "data"
)]
pub async fn get_latest_reading(
    State(state): State<AppState>,
) -> Result<Json<Option<ReadingDto>>, AppError> {
    let row = sqlx::query_as::<_, Reading>(
        "SELECT id, user_id, ph, turbidity, temperature, tds, created_at \
         FROM dataset_history \
         ORDER BY created_at DESC \
         LIMIT 1",
    )
    .fetch_optional(&state.pool)
    .await?;

    Ok(Json(row.map(Into::into)))
}

// ---------------------------------------------------------------------------
// Scan control
// ---------------------------------------------------------------------------

/// Current shared scan status — what every client reads on mount to resume
/// a globally-running scan. With `Accept: text/event-stream` streams status
/// updates instead, starting with the current record.
#[utoipa::path(
    get,
    path = "/scan/status",
    responses(
        (status = 200, description = "Shared auto-scan status", body = ScanStatusDto),
        (status = 500, description = "Internal server error"),
    ),
    tag = "scan"
)]
pub async fn get_scan_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if wants_event_stream(&headers) {
        let subscription = state.bridge.subscribe_status();
        let current = ScanStatusDto::from(state.scan_status.fetch().await?);

        let first = Event::default().json_data(&current);
        let stream = tokio_stream::once(first)
            .chain(subscription.map(|row| Event::default().json_data(&ScanStatusDto::from(row))));

        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response());
    }

    let row = state.scan_status.fetch().await?;
    Ok(Json(ScanStatusDto::from(row)).into_response())
}

/// Start the cluster-wide auto-scan at the requested interval.
#[utoipa::path(
    post,
    path = "/scan/start",
    request_body = StartScanRequest,
    responses(
        (status = 200, description = "Scan started (or already running)", body = ScanControlResponse),
        (status = 400, description = "Interval not in the allowed set"),
    ),
    tag = "scan"
)]
pub async fn start_scan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StartScanRequest>,
) -> Result<Json<ScanControlResponse>, AppError> {
    let user = user_from_headers(&headers)?;
    let outcome = state.coordinator.start(request.interval_ms, user).await?;
    let status = state.scan_status.fetch().await?;

    Ok(Json(ScanControlResponse {
        success: outcome.is_success(),
        message: outcome.message().to_owned(),
        outcome,
        status: status.into(),
    }))
}

/// Stop the cluster-wide auto-scan. Historical readings are untouched.
#[utoipa::path(
    post,
    path = "/scan/stop",
    responses(
        (status = 200, description = "Scan stopped", body = ScanControlResponse),
    ),
    tag = "scan"
)]
pub async fn stop_scan(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ScanControlResponse>, AppError> {
    let user = user_from_headers(&headers)?;
    let outcome = state.coordinator.stop(user).await?;
    let status = state.scan_status.fetch().await?;

    Ok(Json(ScanControlResponse {
        success: outcome.is_success(),
        message: outcome.message().to_owned(),
        outcome,
        status: status.into(),
    }))
}

/// Save one reading now on behalf of the authenticated user. Shares the
/// in-flight gate with the auto-scan, so it can report `busy` instead of
/// double-saving.
#[utoipa::path(
    post,
    path = "/scan/save",
    responses(
        (status = 200, description = "Save attempted", body = ScanControlResponse),
        (status = 401, description = "No acting user"),
    ),
    tag = "scan"
)]
pub async fn save_now(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ScanControlResponse>, AppError> {
    let user = user_from_headers(&headers)?.ok_or(AppError::Unauthorized)?;
    let outcome = state.coordinator.save_now(user).await?;
    let status = state.scan_status.fetch().await?;

    Ok(Json(ScanControlResponse {
        success: outcome.is_success(),
        message: outcome.message().to_owned(),
        outcome,
        status: status.into(),
    }))
}

// ---------------------------------------------------------------------------
// Cron trigger
// ---------------------------------------------------------------------------

/// Entry point for the external scheduler: fetch (device first, cloud
/// fallback) and persist one reading tagged to the configured default
/// account. Plain-text body by design — the scheduler only logs it.
#[utoipa::path(
    post,
    path = "/cron/scan",
    responses(
        (status = 200, description = "Reading saved"),
        (status = 400, description = "No data received"),
        (status = 500, description = "Fetch or insert failed"),
    ),
    tag = "scan"
)]
pub async fn cron_scan(State(state): State<AppState>) -> (StatusCode, String) {
    match state.source.fetch().await {
        FetchOutcome::Value { payload, .. } => {
            match state.ingest.record(payload, state.cron_user_id).await {
                Ok(reading) => (
                    StatusCode::OK,
                    format!("Cron saved at {}", reading.created_at.to_rfc3339()),
                ),
                Err(IngestError::EmptyPayload) => {
                    (StatusCode::BAD_REQUEST, "No data received".to_owned())
                }
                Err(e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Cron insert failed: {e}"),
                ),
            }
        }
        FetchOutcome::Empty => (StatusCode::BAD_REQUEST, "No data received".to_owned()),
        FetchOutcome::Unreachable => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Cron failed: device and cloud copy unreachable".to_owned(),
        ),
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        get_live_data,
        ingest_reading,
        get_readings,
        get_latest_reading,
        get_scan_status,
        start_scan,
        stop_scan,
        save_now,
        cron_scan,
        health,
    ),
    components(schemas(
        ReadingDto,
        ScanStatusDto,
        StartScanRequest,
        UploadResponse,
        ScanControlResponse,
        LiveDataResponse,
        DeviceStatus,
        SensorPayload,
        ScanOutcome,
    )),
    tags(
        (name = "data", description = "Reading ingestion and history"),
        (name = "scan", description = "Auto-scan coordination"),
        (name = "system", description = "System endpoints"),
    ),
    info(
        title = "AquaCheck Scan Service API",
        version = "0.1.0",
        description = "REST API for water-quality readings and auto-scan coordination"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::{routing::get, Router};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use sqlx::PgPool;
    use tokio::net::TcpListener;

    use crate::{
        api::{router, AppState},
        bridge::RealtimeBridge,
        ingest::IngestService,
        scan::{ScanCoordinator, ScanStatusStore},
        sensor::SensorSource,
        snapshot::LiveSnapshot,
    };

    use super::*;

    fn state_for(pool: PgPool, device_url: &str) -> AppState {
        let snapshot = LiveSnapshot::new();
        let bridge = RealtimeBridge::new();
        let ingest = IngestService::new(pool.clone(), snapshot.clone(), bridge.clone());
        let source = SensorSource::with_endpoints(
            device_url.to_owned(),
            None,
            Duration::from_millis(500),
        );
        let scan_status = ScanStatusStore::new(pool.clone());
        let coordinator = ScanCoordinator::new(
            scan_status.clone(),
            source.clone(),
            ingest.clone(),
            vec![60_000, 900_000],
        );

        AppState {
            pool,
            snapshot,
            bridge,
            ingest,
            coordinator,
            source,
            scan_status,
            offline_threshold: Duration::from_secs(15),
            cron_user_id: None,
        }
    }

    /// Server whose sensor device is unreachable — enough for everything
    /// that does not exercise the fetch path.
    fn test_server(pool: PgPool) -> TestServer {
        TestServer::new(router(state_for(pool, "http://127.0.0.1:9/data"))).unwrap()
    }

    async fn device_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/data",
            get(|| async { Json(json!({ "ph": "7.1", "tds": 250 })) }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/data")
    }

    async fn reading_count(pool: &PgPool) -> i64 {
        sqlx::query_scalar("SELECT count(*) FROM dataset_history")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // POST /data and /upload
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn upload_persists_and_echoes_latest_data(pool: PgPool) {
        let server = test_server(pool.clone());

        let resp = server
            .post("/data")
            .json(&json!({ "ph": "7.256", "turbidity": 3.44, "temperature": 28, "tds": "245" }))
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["outcome"], "saved");
        assert_eq!(body["latestData"]["ph"], 7.26);
        assert_eq!(body["latestData"]["turbidity"], 3.4);
        assert_eq!(body["latestData"]["tds"], 245.0);

        assert_eq!(reading_count(&pool).await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upload_preserves_a_zero_reading(pool: PgPool) {
        let server = test_server(pool.clone());

        let resp = server
            .post("/data")
            .json(&json!({ "ph": "0", "turbidity": null, "temperature": null, "tds": null }))
            .await;
        resp.assert_status_ok();

        let ph: Option<f64> = sqlx::query_scalar("SELECT ph FROM dataset_history")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(ph, Some(0.0), "a pushed \"0\" must persist as 0, not null");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn empty_payload_is_rejected_with_400(pool: PgPool) {
        let server = test_server(pool.clone());

        let resp = server.post("/data").json(&json!({})).await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let body: Value = resp.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["outcome"], "empty_payload");
        assert_eq!(reading_count(&pool).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upload_alias_matches_data_route(pool: PgPool) {
        let server = test_server(pool.clone());

        let resp = server.post("/upload").json(&json!({ "temperature": 26.4 })).await;
        resp.assert_status_ok();
        assert_eq!(reading_count(&pool).await, 1);
    }

    // -----------------------------------------------------------------------
    // GET /data
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn live_data_is_offline_before_any_push(pool: PgPool) {
        let server = test_server(pool);

        let resp = server.get("/data").await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["status"], "offline");
        assert!(body["data"].is_null());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn live_data_reports_online_after_a_push(pool: PgPool) {
        let server = test_server(pool);

        server.post("/data").json(&json!({ "ph": 7.0 })).await.assert_status_ok();

        let resp = server.get("/data").await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["status"], "online");
        assert_eq!(body["data"]["ph"], 7.0);
        assert!(!body["last_updated"].is_null());
    }

    // -----------------------------------------------------------------------
    // GET /readings
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn readings_range_returns_exactly_the_inserted_row(pool: PgPool) {
        let server = test_server(pool);

        server
            .post("/data")
            .json(&json!({ "ph": 7.25, "turbidity": 3.4, "temperature": 28.0, "tds": 245 }))
            .await
            .assert_status_ok();

        let from = (Utc::now() - chrono::Duration::minutes(1)).to_rfc3339();
        let to = (Utc::now() + chrono::Duration::minutes(1)).to_rfc3339();
        let resp = server
            .get("/readings")
            .add_query_param("from", &from)
            .add_query_param("to", &to)
            .await;
        resp.assert_status_ok();

        let body: Vec<Value> = resp.json();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0]["ph"], 7.25);
        assert_eq!(body[0]["turbidity"], 3.4);
        assert_eq!(body[0]["temperature"], 28.0);
        assert_eq!(body[0]["tds"], 245.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn readings_outside_the_range_are_excluded(pool: PgPool) {
        let server = test_server(pool);

        server.post("/data").json(&json!({ "ph": 7.0 })).await.assert_status_ok();

        let from = (Utc::now() + chrono::Duration::minutes(5)).to_rfc3339();
        let resp = server.get("/readings").add_query_param("from", &from).await;
        resp.assert_status_ok();

        let body: Vec<Value> = resp.json();
        assert!(body.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn latest_reading_is_null_when_table_is_empty(pool: PgPool) {
        let server = test_server(pool);

        let resp = server.get("/readings/latest").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert!(body.is_null());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn latest_reading_returns_the_most_recent(pool: PgPool) {
        let server = test_server(pool);

        server.post("/data").json(&json!({ "ph": 6.9 })).await.assert_status_ok();
        server.post("/data").json(&json!({ "ph": 7.3 })).await.assert_status_ok();

        let resp = server.get("/readings/latest").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["ph"], 7.3);
    }

    // -----------------------------------------------------------------------
    // Scan control
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn scan_status_starts_with_the_seeded_default(pool: PgPool) {
        let server = test_server(pool);

        let resp = server.get("/scan/status").await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["running"], false);
        assert_eq!(body["interval_ms"], 900_000);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn start_then_stop_transitions_the_shared_record(pool: PgPool) {
        let server = test_server(pool);
        let user = Uuid::new_v4();

        let resp = server
            .post("/scan/start")
            .add_header("x-user-id", user.to_string())
            .json(&json!({ "interval_ms": 60_000 }))
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["outcome"], "started");
        assert_eq!(body["status"]["running"], true);
        assert_eq!(body["status"]["interval_ms"], 60_000);
        assert_eq!(body["status"]["started_by"], user.to_string());

        // A second start from the same process is a no-op.
        let resp = server
            .post("/scan/start")
            .json(&json!({ "interval_ms": 60_000 }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["outcome"], "already_running");

        let resp = server.post("/scan/stop").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["outcome"], "stopped");
        assert_eq!(body["status"]["running"], false);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn start_rejects_an_unlisted_interval(pool: PgPool) {
        let server = test_server(pool.clone());

        let resp = server
            .post("/scan/start")
            .json(&json!({ "interval_ms": 123 }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let body: Value = resp.json();
        assert_eq!(body["outcome"], "invalid_interval");

        let row = ScanStatusStore::new(pool).fetch().await.unwrap();
        assert!(!row.running);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn camel_case_interval_field_is_accepted(pool: PgPool) {
        let server = test_server(pool);

        let resp = server
            .post("/scan/start")
            .json(&json!({ "intervalMs": 900_000 }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"]["interval_ms"], 900_000);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn manual_save_requires_an_acting_user(pool: PgPool) {
        let server = test_server(pool.clone());

        let resp = server.post("/scan/save").await;
        resp.assert_status(StatusCode::UNAUTHORIZED);

        let body: Value = resp.json();
        assert_eq!(body["outcome"], "unauthorized");
        assert_eq!(reading_count(&pool).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn manual_save_persists_for_the_header_user(pool: PgPool) {
        let device = device_server().await;
        let server = TestServer::new(router(state_for(pool.clone(), &device))).unwrap();
        let user = Uuid::new_v4();

        let resp = server
            .post("/scan/save")
            .add_header("x-user-id", user.to_string())
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["outcome"], "saved");

        let user_id: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM dataset_history")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(user_id, Some(user));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn manual_save_reports_unreachable_without_a_write(pool: PgPool) {
        let server = test_server(pool.clone());

        let resp = server
            .post("/scan/save")
            .add_header("x-user-id", Uuid::new_v4().to_string())
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["outcome"], "device_unreachable");
        assert_eq!(reading_count(&pool).await, 0);
    }

    // -----------------------------------------------------------------------
    // POST /cron/scan
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn cron_saves_from_the_device_and_reports_plain_text(pool: PgPool) {
        let device = device_server().await;
        let server = TestServer::new(router(state_for(pool.clone(), &device))).unwrap();

        let resp = server.post("/cron/scan").await;
        resp.assert_status_ok();
        assert!(resp.text().starts_with("Cron saved at "));

        assert_eq!(reading_count(&pool).await, 1);
        let user_id: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM dataset_history")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(user_id, None);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn cron_reports_failure_when_everything_is_down(pool: PgPool) {
        let server = test_server(pool.clone());

        let resp = server.post("/cron/scan").await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.text().starts_with("Cron failed"));
        assert_eq!(reading_count(&pool).await, 0);
    }

    // -----------------------------------------------------------------------
    // System endpoints
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn health_returns_ok(pool: PgPool) {
        let server = test_server(pool);
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "ok");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn openapi_spec_is_served(pool: PgPool) {
        let server = test_server(pool);
        let resp = server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "AquaCheck Scan Service API");
    }
}

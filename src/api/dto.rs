use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::{Reading, ScanStatusRow};
use crate::scan::ScanOutcome;
use crate::sensor::payload::SensorPayload;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadingDto {
    pub id: Uuid,
    /// Owner of the save; null for unattended (device/cron/coordinator) saves.
    pub user_id: Option<Uuid>,
    pub ph: Option<f64>,
    pub turbidity: Option<f64>,
    pub temperature: Option<f64>,
    pub tds: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<Reading> for ReadingDto {
    fn from(r: Reading) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            ph: r.ph,
            turbidity: r.turbidity,
            temperature: r.temperature,
            tds: r.tds,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanStatusDto {
    pub running: bool,
    pub interval_ms: i64,
    pub started_by: Option<Uuid>,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub next_due_at: Option<DateTime<Utc>>,
}

impl From<ScanStatusRow> for ScanStatusDto {
    fn from(r: ScanStatusRow) -> Self {
        Self {
            running: r.running,
            interval_ms: r.interval_ms,
            started_by: r.started_by,
            last_scan_time: r.last_scan_time,
            next_due_at: r.next_due_at,
        }
    }
}

/// Request body for `POST /scan/start`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartScanRequest {
    #[serde(alias = "intervalMs")]
    pub interval_ms: i64,
}

/// Response for `POST /data` / `POST /upload`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub outcome: ScanOutcome,
    #[serde(rename = "latestData")]
    pub latest_data: SensorPayload,
}

/// Response for the scan control endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanControlResponse {
    pub success: bool,
    pub message: String,
    pub outcome: ScanOutcome,
    pub status: ScanStatusDto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// Response for `GET /data` (JSON variant).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LiveDataResponse {
    pub status: DeviceStatus,
    /// Latest pushed values; null until the device reports for the first time.
    pub data: Option<SensorPayload>,
    pub last_updated: Option<DateTime<Utc>>,
}

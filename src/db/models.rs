use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One persisted sensor sample from the `dataset_history` table.
///
/// Measurement fields are individually nullable: a sample is valid as long
/// as at least one of them is present (enforced by a table CHECK and by
/// ingestion validation). `user_id` is null for unattended saves.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub ph: Option<f64>,
    pub turbidity: Option<f64>,
    pub temperature: Option<f64>,
    pub tds: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// The singleton `device_scanning` row (always `id = 1`).
///
/// `running = false` means `next_due_at` carries no meaning; `interval_ms`
/// must not change while `running = true` — callers stop the scan first.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScanStatusRow {
    pub id: i32,
    pub running: bool,
    pub interval_ms: i64,
    pub started_by: Option<Uuid>,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub next_due_at: Option<DateTime<Utc>>,
}

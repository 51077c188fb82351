use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::bridge::SCAN_STATUS_CHANNEL;
use crate::db::models::ScanStatusRow;

/// Fixed key of the singleton `device_scanning` row.
const SCAN_STATUS_ID: i32 = 1;

const COLUMNS: &str = "id, running, interval_ms, started_by, last_scan_time, next_due_at";

/// Read-modify-write access to the shared scan status record.
///
/// All writes target the fixed row and end with a `pg_notify`, so every
/// instance (this one included) observes the change through its listener
/// and realigns its local timer. Last writer wins — the domain tolerates a
/// momentarily stale countdown, never a duplicated reading.
#[derive(Clone)]
pub struct ScanStatusStore {
    pool: PgPool,
}

impl ScanStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Current status, inserting the default row if it is missing. The
    /// migration seeds it, so the insert only matters for a wiped table.
    pub async fn fetch(&self) -> sqlx::Result<ScanStatusRow> {
        let existing = sqlx::query_as::<_, ScanStatusRow>(&format!(
            "SELECT {COLUMNS} FROM device_scanning WHERE id = $1"
        ))
        .bind(SCAN_STATUS_ID)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return Ok(row);
        }

        sqlx::query("INSERT INTO device_scanning (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(SCAN_STATUS_ID)
            .execute(&self.pool)
            .await?;

        sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM device_scanning WHERE id = $1"
        ))
        .bind(SCAN_STATUS_ID)
        .fetch_one(&self.pool)
        .await
    }

    /// Flip the record to running with a fresh interval and due time.
    pub async fn set_running(
        &self,
        interval_ms: i64,
        started_by: Option<Uuid>,
    ) -> sqlx::Result<ScanStatusRow> {
        let now = Utc::now();
        let next_due = now + Duration::milliseconds(interval_ms);

        let row = sqlx::query_as::<_, ScanStatusRow>(&format!(
            "INSERT INTO device_scanning (id, running, interval_ms, started_by, next_due_at) \
             VALUES ($1, TRUE, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE \
             SET running = TRUE, interval_ms = $2, started_by = $3, next_due_at = $4 \
             RETURNING {COLUMNS}"
        ))
        .bind(SCAN_STATUS_ID)
        .bind(interval_ms)
        .bind(started_by)
        .bind(next_due)
        .fetch_one(&self.pool)
        .await?;

        self.notify().await;
        Ok(row)
    }

    /// Flip the record to stopped. Historical readings are untouched.
    pub async fn set_stopped(&self) -> sqlx::Result<ScanStatusRow> {
        let row = sqlx::query_as::<_, ScanStatusRow>(&format!(
            "INSERT INTO device_scanning (id, running) VALUES ($1, FALSE) \
             ON CONFLICT (id) DO UPDATE SET running = FALSE, next_due_at = NULL \
             RETURNING {COLUMNS}"
        ))
        .bind(SCAN_STATUS_ID)
        .fetch_one(&self.pool)
        .await?;

        self.notify().await;
        Ok(row)
    }

    /// Advance `last_scan_time`/`next_due_at` after a successful tick save.
    ///
    /// Guarded by `running = TRUE` so a tick that lost a race with stop
    /// leaves the record alone; returns `None` in that case.
    pub async fn record_tick(
        &self,
        scanned_at: DateTime<Utc>,
    ) -> sqlx::Result<Option<ScanStatusRow>> {
        let row = sqlx::query_as::<_, ScanStatusRow>(&format!(
            "UPDATE device_scanning \
             SET last_scan_time = $2, \
                 next_due_at = $2 + interval_ms * interval '1 millisecond' \
             WHERE id = $1 AND running = TRUE \
             RETURNING {COLUMNS}"
        ))
        .bind(SCAN_STATUS_ID)
        .bind(scanned_at)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_some() {
            self.notify().await;
        }
        Ok(row)
    }

    /// Best-effort change notification; a missed notify only delays
    /// followers until the next event, so failures are logged and dropped.
    async fn notify(&self) {
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(SCAN_STATUS_CHANNEL)
            .execute(&self.pool)
            .await
        {
            warn!(error = %e, "failed to notify scan status change");
        }
    }
}

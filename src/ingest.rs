use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{
    bridge::RealtimeBridge, db::models::Reading, sensor::payload::SensorPayload,
    snapshot::LiveSnapshot,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no sensor values in payload")]
    EmptyPayload,
    #[error("storage write failed: {0}")]
    Store(#[from] sqlx::Error),
}

/// The single entry point through which every reading reaches storage —
/// device pushes, coordinator ticks, manual saves and the cron trigger all
/// funnel here, so validation, normalization and broadcast happen exactly
/// once regardless of origin.
#[derive(Clone)]
pub struct IngestService {
    pool: PgPool,
    snapshot: LiveSnapshot,
    bridge: RealtimeBridge,
}

impl IngestService {
    pub fn new(pool: PgPool, snapshot: LiveSnapshot, bridge: RealtimeBridge) -> Self {
        Self { pool, snapshot, bridge }
    }

    /// Validate, normalize and persist one reading, then notify live
    /// viewers. Rejects value-free payloads before touching storage.
    pub async fn record(
        &self,
        payload: SensorPayload,
        user_id: Option<Uuid>,
    ) -> Result<Reading, IngestError> {
        if payload.is_empty() {
            return Err(IngestError::EmptyPayload);
        }

        let normalized = payload.normalized();
        let reading = sqlx::query_as::<_, Reading>(
            "INSERT INTO dataset_history (user_id, ph, turbidity, temperature, tds) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, ph, turbidity, temperature, tds, created_at",
        )
        .bind(user_id)
        .bind(normalized.ph)
        .bind(normalized.turbidity)
        .bind(normalized.temperature)
        .bind(normalized.tds)
        .fetch_one(&self.pool)
        .await?;

        info!(reading_id = %reading.id, user_id = ?user_id, "reading persisted");
        self.bridge.publish_reading(normalized);
        Ok(reading)
    }

    /// Entry point for pushes from the device (or its proxy): persists the
    /// reading unattended and refreshes the live snapshot. The snapshot is
    /// only touched after the write commits, so a failed insert never shows
    /// up as fresh data.
    pub async fn push(&self, payload: SensorPayload) -> Result<Reading, IngestError> {
        let reading = self.record(payload, None).await?;
        self.snapshot.update(SensorPayload::from(&reading)).await;
        Ok(reading)
    }
}

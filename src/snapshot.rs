use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::sensor::payload::SensorPayload;

/// The most recently pushed reading together with its arrival time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub payload: SensorPayload,
    pub received_at: DateTime<Utc>,
}

/// Per-process latest-known reading, used for immediate display and as the
/// backing data of the cloud-copy endpoint. Overwritten on every inbound
/// push; never persisted; has no identity beyond "latest".
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
#[derive(Clone, Default)]
pub struct LiveSnapshot {
    inner: Arc<RwLock<Option<Snapshot>>>,
}

impl LiveSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the snapshot. Concurrent pushes race benignly —
    /// last write wins by arrival order.
    pub async fn update(&self, payload: SensorPayload) {
        *self.inner.write().await = Some(Snapshot { payload, received_at: Utc::now() });
    }

    /// The current snapshot, if any reading has arrived since startup.
    pub async fn current(&self) -> Option<Snapshot> {
        *self.inner.read().await
    }

    /// True when a reading arrived within `threshold` — the device is
    /// considered online for display purposes.
    pub async fn is_fresh(&self, threshold: Duration) -> bool {
        match *self.inner.read().await {
            Some(snap) => {
                let age = Utc::now().signed_duration_since(snap.received_at);
                age.to_std().map(|a| a <= threshold).unwrap_or(true)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(ph: f64) -> SensorPayload {
        SensorPayload { ph: Some(ph), ..Default::default() }
    }

    #[tokio::test]
    async fn starts_empty_and_stale() {
        let snap = LiveSnapshot::new();
        assert!(snap.current().await.is_none());
        assert!(!snap.is_fresh(Duration::from_secs(15)).await);
    }

    #[tokio::test]
    async fn update_overwrites_previous_value() {
        let snap = LiveSnapshot::new();
        snap.update(payload(7.0)).await;
        snap.update(payload(7.5)).await;

        let current = snap.current().await.unwrap();
        assert_eq!(current.payload.ph, Some(7.5));
    }

    #[tokio::test]
    async fn fresh_within_threshold() {
        let snap = LiveSnapshot::new();
        snap.update(payload(7.0)).await;
        assert!(snap.is_fresh(Duration::from_secs(15)).await);
        assert!(!snap.is_fresh(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let snap = LiveSnapshot::new();
        let clone = snap.clone();

        snap.update(payload(6.8)).await;

        let got = clone.current().await.unwrap();
        assert_eq!(got.payload.ph, Some(6.8));
    }
}

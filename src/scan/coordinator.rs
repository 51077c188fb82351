use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    db::models::ScanStatusRow,
    ingest::{IngestError, IngestService},
    sensor::{FetchOrigin, FetchOutcome, SensorSource},
};

use super::{ScanError, ScanOutcome, ScanStatusStore};

/// Owns the auto-scan state machine of this process.
///
/// The shared `device_scanning` row is the source of truth for whether a
/// scan is on cluster-wide; the local timer is a derived mirror. This
/// process writes the row only for transitions it originates — changes
/// observed from elsewhere are applied through [`Self::sync_remote`]
/// without a second write.
#[derive(Clone)]
pub struct ScanCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    status: ScanStatusStore,
    source: SensorSource,
    ingest: IngestService,
    allowed_intervals: Vec<i64>,
    /// Present exactly while the local timer task is alive.
    timer: Mutex<Option<ScanTimer>>,
    /// Shared between the auto-tick and manual-save paths: at most one
    /// insert in flight per process. Ticks and manual saves `try_lock` and
    /// skip instead of queueing, so a slow save can never pile up writes.
    save_gate: tokio::sync::Mutex<()>,
    /// Bumped on every stop; an in-flight tick re-checks it before
    /// committing and discards its fetched value on mismatch.
    generation: AtomicU64,
}

struct ScanTimer {
    interval_ms: i64,
    cancel: watch::Sender<()>,
}

impl ScanCoordinator {
    pub fn new(
        status: ScanStatusStore,
        source: SensorSource,
        ingest: IngestService,
        allowed_intervals: Vec<i64>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                status,
                source,
                ingest,
                allowed_intervals,
                timer: Mutex::new(None),
                save_gate: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// True while this process runs a local scan timer.
    pub fn is_running(&self) -> bool {
        self.inner.timer.lock().expect("timer lock").is_some()
    }

    /// Start auto-scanning at `interval_ms`, originated by this process.
    ///
    /// The status row is persisted before any local state changes; only a
    /// committed write flips the cluster to running. A start while already
    /// running locally is a no-op for this process.
    pub async fn start(
        &self,
        interval_ms: i64,
        requested_by: Option<Uuid>,
    ) -> Result<ScanOutcome, ScanError> {
        if !self.inner.allowed_intervals.contains(&interval_ms) {
            return Err(ScanError::InvalidInterval(interval_ms));
        }
        if self.is_running() {
            return Ok(ScanOutcome::AlreadyRunning);
        }

        // The record is the source of truth: if another instance already
        // runs the scan, follow it instead of rewriting the row — the
        // interval is immutable while running.
        let current = self.inner.status.fetch().await?;
        if current.running {
            self.sync_remote(&current);
            return Ok(ScanOutcome::AlreadyRunning);
        }

        self.inner.status.set_running(interval_ms, requested_by).await?;
        info!(interval_ms, requested_by = ?requested_by, "auto-scan started");

        self.ensure_timer(interval_ms, requested_by);
        Ok(ScanOutcome::Started)
    }

    /// Stop auto-scanning. The local timer dies immediately; a fetch or
    /// save already in flight completes but its result is discarded before
    /// commit. Historical readings are untouched.
    pub async fn stop(&self, requested_by: Option<Uuid>) -> Result<ScanOutcome, ScanError> {
        let had_timer = self.cancel_timer();
        if had_timer {
            self.inner.generation.fetch_add(1, Ordering::Release);
        }

        self.inner.status.set_stopped().await?;
        info!(requested_by = ?requested_by, "auto-scan stopped");

        Ok(if had_timer {
            ScanOutcome::Stopped
        } else {
            ScanOutcome::WasNotRunning
        })
    }

    /// One-off save on behalf of `user`, sharing the in-flight gate with
    /// the auto-tick path. Works regardless of coordinator state and never
    /// touches the status row.
    pub async fn save_now(&self, user: Uuid) -> Result<ScanOutcome, ScanError> {
        let Ok(_gate) = self.inner.save_gate.try_lock() else {
            return Ok(ScanOutcome::Busy);
        };

        match self.inner.source.fetch().await {
            FetchOutcome::Value { payload, .. } => {
                match self.inner.ingest.record(payload, Some(user)).await {
                    Ok(_) => Ok(ScanOutcome::Saved),
                    Err(IngestError::EmptyPayload) => Ok(ScanOutcome::NoData),
                    Err(IngestError::Store(e)) => Err(ScanError::Store(e)),
                }
            }
            FetchOutcome::Empty => Ok(ScanOutcome::NoData),
            FetchOutcome::Unreachable => Ok(ScanOutcome::DeviceUnreachable),
        }
    }

    /// Apply a status change this process did not originate (startup
    /// resume or a LISTEN/NOTIFY event): align the local timer with the
    /// received record without writing it back. Idempotent.
    pub fn sync_remote(&self, row: &ScanStatusRow) {
        if row.running {
            {
                let mut guard = self.inner.timer.lock().expect("timer lock");
                match guard.as_ref() {
                    Some(timer) if timer.interval_ms == row.interval_ms => return,
                    // Interval changed out from under a running timer —
                    // realign by replacing it. Dropping the handle cancels
                    // the old loop.
                    Some(_) => {
                        guard.take();
                    }
                    None => {}
                }
            }
            info!(interval_ms = row.interval_ms, "following remote auto-scan start");
            self.ensure_timer(row.interval_ms, row.started_by);
        } else if self.cancel_timer() {
            self.inner.generation.fetch_add(1, Ordering::Release);
            info!("following remote auto-scan stop");
        }
    }

    /// One scheduled evaluation: fetch, then persist at most one reading.
    ///
    /// Overlap protection: if the previous save is still in flight the
    /// tick is skipped — over one running period the number of automated
    /// inserts never exceeds the number of elapsed intervals.
    pub(crate) async fn tick(&self, acting_user: Option<Uuid>) -> ScanOutcome {
        let Ok(_gate) = self.inner.save_gate.try_lock() else {
            warn!("previous save still in flight, skipping tick");
            return ScanOutcome::SkippedInFlight;
        };

        let generation = self.inner.generation.load(Ordering::Acquire);

        match self.inner.source.fetch().await {
            FetchOutcome::Value { payload, origin } => {
                if self.inner.generation.load(Ordering::Acquire) != generation {
                    debug!("scan stopped mid-fetch, discarding reading");
                    return ScanOutcome::Discarded;
                }
                if origin == FetchOrigin::Cloud {
                    debug!("tick served from the cloud copy");
                }

                match self.inner.ingest.record(payload, acting_user).await {
                    Ok(reading) => {
                        match self.inner.status.record_tick(reading.created_at).await {
                            Ok(Some(_)) => {}
                            Ok(None) => debug!("status row no longer running, left untouched"),
                            Err(e) => {
                                warn!(error = %e, "failed to advance scan status after save");
                            }
                        }
                        ScanOutcome::Saved
                    }
                    Err(e) => {
                        // A single failed write does not stop the scan; the
                        // next tick retries on its own.
                        error!(error = %e, "auto-scan save failed");
                        ScanOutcome::WriteFailed
                    }
                }
            }
            FetchOutcome::Empty => {
                debug!("tick yielded no data");
                ScanOutcome::NoData
            }
            FetchOutcome::Unreachable => {
                warn!("device and cloud copy unreachable, will retry next tick");
                ScanOutcome::DeviceUnreachable
            }
        }
    }

    /// Spawn the timer task unless one is already alive. The first tick
    /// fires immediately; later ones every `interval_ms`, skipping (not
    /// bunching) intervals missed under load.
    fn ensure_timer(&self, interval_ms: i64, acting_user: Option<Uuid>) {
        let mut guard = self.inner.timer.lock().expect("timer lock");
        if guard.is_some() {
            return;
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(());
        let coordinator = self.clone();

        tokio::spawn(async move {
            let period = Duration::from_millis(interval_ms.max(1) as u64);
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(interval_ms, "scan timer running");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = coordinator.tick(acting_user).await;
                        debug!(outcome = ?outcome, "scan tick finished");
                    }
                    _ = cancel_rx.changed() => break,
                }
            }
            debug!("scan timer exited");
        });

        *guard = Some(ScanTimer { interval_ms, cancel: cancel_tx });
    }

    /// Drop the local timer if present. Also fires when the owning
    /// `ScanTimer` is replaced, since closing the watch sender ends the
    /// task's select loop.
    fn cancel_timer(&self) -> bool {
        let mut guard = self.inner.timer.lock().expect("timer lock");
        match guard.take() {
            Some(timer) => {
                let _ = timer.cancel.send(());
                true
            }
            None => false,
        }
    }
}

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
    task::{Context, Poll},
    time::Duration,
};

use sqlx::postgres::PgListener;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::{
    db::models::ScanStatusRow,
    scan::{ScanCoordinator, ScanStatusStore},
    sensor::payload::SensorPayload,
};

/// Postgres NOTIFY channel fired after every `device_scanning` write.
pub const SCAN_STATUS_CHANNEL: &str = "scan_status_changed";

// ---------------------------------------------------------------------------
// Subscriber registry
// ---------------------------------------------------------------------------

/// Push-fanout registry keyed by subscriber id.
///
/// Each subscriber holds an unbounded channel handle; dropping the
/// `Subscription` removes its entry by id, so disconnect cleanup is O(1)
/// and explicit rather than scan-based.
pub struct SubscriberRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

struct RegistryInner<T> {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, UnboundedSender<T>>>,
}

impl<T> Clone for SubscriberRegistry<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl<T: Clone> SubscriberRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. The returned handle unregisters itself
    /// when dropped.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .expect("subscriber registry lock")
            .insert(id, tx);
        Subscription { id, rx, registry: Arc::downgrade(&self.inner) }
    }

    /// Deliver `value` to every current subscriber, in subscription
    /// channel order per subscriber. Closed receivers are ignored; their
    /// entries disappear when the corresponding `Subscription` drops.
    pub fn publish(&self, value: T) {
        let subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("subscriber registry lock");
        for tx in subscribers.values() {
            let _ = tx.send(value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .expect("subscriber registry lock")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A live subscription to a `SubscriberRegistry`. Dropping it removes the
/// registry entry by id.
pub struct Subscription<T> {
    id: u64,
    rx: UnboundedReceiver<T>,
    registry: Weak<RegistryInner<T>>,
}

impl<T> Subscription<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .subscribers
                .lock()
                .expect("subscriber registry lock")
                .remove(&self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// RealtimeBridge
// ---------------------------------------------------------------------------

/// Fans out scan-status updates and latest-reading pushes to every
/// connected client of this process.
///
/// Status events enter exclusively through the LISTEN/NOTIFY path below, so
/// subscribers observe them in the order the writes committed at the store.
/// Reading pushes are most-recent-wins snapshots with no ordering guarantee
/// beyond that.
#[derive(Clone, Default)]
pub struct RealtimeBridge {
    status: SubscriberRegistry<ScanStatusRow>,
    readings: SubscriberRegistry<SensorPayload>,
}

impl RealtimeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_status(&self) -> Subscription<ScanStatusRow> {
        self.status.subscribe()
    }

    pub fn subscribe_readings(&self) -> Subscription<SensorPayload> {
        self.readings.subscribe()
    }

    pub fn publish_status(&self, row: ScanStatusRow) {
        self.status.publish(row);
    }

    pub fn publish_reading(&self, payload: SensorPayload) {
        self.readings.publish(payload);
    }
}

// ---------------------------------------------------------------------------
// Cross-instance status propagation
// ---------------------------------------------------------------------------

/// Follows `device_scanning` changes made by any instance and applies them
/// locally: the coordinator aligns its timer (without re-writing the row)
/// and local subscribers receive the fresh status.
///
/// Notifications carry no payload; each one triggers a single re-fetch of
/// the current row, so a dropped connection costs nothing but a re-fetch —
/// there is no dependence on replaying missed events. Runs until the
/// process shuts down, reconnecting with a flat delay on channel loss.
pub async fn run_status_listener(
    status: ScanStatusStore,
    coordinator: ScanCoordinator,
    bridge: RealtimeBridge,
) {
    loop {
        match PgListener::connect_with(status.pool()).await {
            Ok(mut listener) => {
                if let Err(e) = listener.listen(SCAN_STATUS_CHANNEL).await {
                    warn!(error = %e, "failed to LISTEN on scan status channel");
                } else {
                    debug!(channel = SCAN_STATUS_CHANNEL, "scan status listener connected");
                    // Resynchronize once per (re)connect — this is also how a
                    // fresh process resumes a scan that is already running
                    // cluster-wide.
                    resync(&status, &coordinator, &bridge).await;

                    loop {
                        match listener.recv().await {
                            Ok(_) => resync(&status, &coordinator, &bridge).await,
                            Err(e) => {
                                warn!(error = %e, "scan status listener dropped, reconnecting");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "scan status listener failed to connect");
            }
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn resync(status: &ScanStatusStore, coordinator: &ScanCoordinator, bridge: &RealtimeBridge) {
    match status.fetch().await {
        Ok(row) => {
            coordinator.sync_remote(&row);
            bridge.publish_status(row);
        }
        Err(e) => warn!(error = %e, "failed to re-fetch scan status"),
    }
}

pub mod coordinator;
pub mod status;

pub use coordinator::ScanCoordinator;
pub use status::ScanStatusStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Machine-readable result of a scan operation. Every operation also
/// carries the matching human-readable status line from [`Self::message`];
/// clients display the string and branch on the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Started,
    AlreadyRunning,
    Stopped,
    WasNotRunning,
    Saved,
    Busy,
    SkippedInFlight,
    NoData,
    DeviceUnreachable,
    Discarded,
    WriteFailed,
}

impl ScanOutcome {
    pub fn message(self) -> &'static str {
        match self {
            ScanOutcome::Started => "Auto-scan started",
            ScanOutcome::AlreadyRunning => "Auto-scan is already running",
            ScanOutcome::Stopped => "Auto-scan stopped",
            ScanOutcome::WasNotRunning => "Auto-scan was not running",
            ScanOutcome::Saved => "Reading saved",
            ScanOutcome::Busy => "A save is already in progress",
            ScanOutcome::SkippedInFlight => "Previous save still in flight, tick skipped",
            ScanOutcome::NoData => "No sensor data available",
            ScanOutcome::DeviceUnreachable => "Sensor device and cloud copy unreachable",
            ScanOutcome::Discarded => "Scan stopped before the fetched reading was saved",
            ScanOutcome::WriteFailed => "Failed to persist the reading",
        }
    }

    /// True for outcomes that mean the requested effect took place.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            ScanOutcome::Started
                | ScanOutcome::AlreadyRunning
                | ScanOutcome::Stopped
                | ScanOutcome::WasNotRunning
                | ScanOutcome::Saved
        )
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("interval {0} ms is not an allowed scan interval")]
    InvalidInterval(i64),
    #[error("storage write failed: {0}")]
    Store(#[from] sqlx::Error),
}

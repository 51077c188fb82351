use anyhow::{Context, Result};
use uuid::Uuid;

/// Scan intervals offered by default when `SCAN_INTERVALS_MS` is unset:
/// 1, 5, 15, 30 and 60 minutes.
const DEFAULT_INTERVALS_MS: [i64; 5] = [60_000, 300_000, 900_000, 1_800_000, 3_600_000];

/// Default scan interval: 15 minutes.
pub const DEFAULT_INTERVAL_MS: i64 = 900_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Primary sensor endpoint on the local network.
    pub device_url: String,
    /// Secondary endpoint serving the cloud-cached copy of the latest reading.
    pub cloud_url: Option<String>,
    /// Bound on each device/cloud fetch, in seconds.
    pub fetch_timeout_secs: u64,
    /// Snapshot older than this is reported as "offline".
    pub offline_threshold_secs: u64,
    /// Intervals that `POST /scan/start` accepts, in milliseconds.
    pub allowed_intervals_ms: Vec<i64>,
    /// Account that cron-triggered saves are attributed to.
    pub cron_user_id: Option<Uuid>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            device_url: optional("DEVICE_URL", "http://aquacheck.local:5000/data"),
            cloud_url: std::env::var("CLOUD_DATA_URL").ok().filter(|s| !s.is_empty()),
            fetch_timeout_secs: optional("FETCH_TIMEOUT_SECS", "5")
                .parse()
                .context("FETCH_TIMEOUT_SECS must be a positive integer")?,
            offline_threshold_secs: optional("OFFLINE_THRESHOLD_SECS", "15")
                .parse()
                .context("OFFLINE_THRESHOLD_SECS must be a positive integer")?,
            allowed_intervals_ms: parse_intervals(&optional("SCAN_INTERVALS_MS", ""))?,
            cron_user_id: parse_cron_user(std::env::var("CRON_USER_ID").ok().as_deref())?,
        })
    }
}

/// Parse `"60000,900000"` into a sorted interval list.
///
/// An empty string yields the default set. Rejects anything that is not a
/// positive integer number of milliseconds.
fn parse_intervals(raw: &str) -> Result<Vec<i64>> {
    if raw.trim().is_empty() {
        return Ok(DEFAULT_INTERVALS_MS.to_vec());
    }

    let mut intervals = raw
        .split(',')
        .map(|entry| {
            let ms: i64 = entry
                .trim()
                .parse()
                .with_context(|| format!("SCAN_INTERVALS_MS entry is not an integer: {entry:?}"))?;
            anyhow::ensure!(ms > 0, "SCAN_INTERVALS_MS entry must be positive: {entry:?}");
            Ok(ms)
        })
        .collect::<Result<Vec<_>>>()?;

    intervals.sort_unstable();
    intervals.dedup();
    Ok(intervals)
}

fn parse_cron_user(raw: Option<&str>) -> Result<Option<Uuid>> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => Ok(Some(
            s.trim()
                .parse()
                .with_context(|| format!("CRON_USER_ID is not a valid UUID: {s:?}"))?,
        )),
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

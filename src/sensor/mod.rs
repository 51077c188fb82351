pub mod payload;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, warn};

use crate::{config::Config, response_store};

use self::payload::SensorPayload;

/// Which endpoint ultimately produced a fetched payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    Device,
    Cloud,
}

/// Tri-state result of a sensor fetch. This boundary never propagates an
/// error upward — callers handle exactly these three cases.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// At least one usable measurement, from the named origin.
    Value {
        payload: SensorPayload,
        origin: FetchOrigin,
    },
    /// An endpoint responded but no usable fields were present.
    Empty,
    /// Neither the device nor the cloud copy responded.
    Unreachable,
}

/// Fetches one instantaneous reading, trying the local device endpoint
/// first and falling back to the cloud-cached copy when the device is
/// offline or times out.
#[derive(Debug, Clone)]
pub struct SensorSource {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    device_url: String,
    cloud_url: Option<String>,
}

impl SensorSource {
    pub fn new(config: &Config) -> Self {
        Self::with_endpoints(
            config.device_url.clone(),
            config.cloud_url.clone(),
            Duration::from_secs(config.fetch_timeout_secs),
        )
    }

    /// Build a source against explicit endpoints. `timeout` bounds every
    /// request to either endpoint.
    pub fn with_endpoints(device_url: String, cloud_url: Option<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client with static configuration");

        Self {
            inner: Arc::new(Inner { http, device_url, cloud_url }),
        }
    }

    /// Fetch the current reading.
    ///
    /// Timeouts, connection errors and non-2xx statuses from the device are
    /// absorbed by falling back to the cloud copy; a reachable endpoint
    /// with an unparseable or value-free body counts as `Empty`.
    pub async fn fetch(&self) -> FetchOutcome {
        let mut responded = false;

        match self.fetch_one(&self.inner.device_url, "device").await {
            Ok(payload) if !payload.is_empty() => {
                return FetchOutcome::Value { payload, origin: FetchOrigin::Device };
            }
            Ok(_) => {
                debug!(url = %self.inner.device_url, "device responded without usable values");
                responded = true;
            }
            Err(e) => {
                warn!(url = %self.inner.device_url, error = %e, "device fetch failed, trying cloud copy");
            }
        }

        if let Some(cloud_url) = &self.inner.cloud_url {
            match self.fetch_one(cloud_url, "cloud").await {
                Ok(payload) if !payload.is_empty() => {
                    return FetchOutcome::Value { payload, origin: FetchOrigin::Cloud };
                }
                Ok(_) => {
                    debug!(url = %cloud_url, "cloud copy responded without usable values");
                    responded = true;
                }
                Err(e) => {
                    warn!(url = %cloud_url, error = %e, "cloud fetch failed");
                }
            }
        }

        if responded {
            FetchOutcome::Empty
        } else {
            FetchOutcome::Unreachable
        }
    }

    /// GET one endpoint and coerce its body.
    ///
    /// HTTP and network failures are `Err`; a 2xx body that is not JSON
    /// yields an empty payload so that the caller can distinguish
    /// "responded with nothing" from "did not respond".
    async fn fetch_one(&self, url: &str, source: &str) -> Result<SensorPayload> {
        debug!(url = %url, "Fetching sensor data");

        let bytes = self
            .inner
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("{source} request failed"))?
            .error_for_status()
            .with_context(|| format!("{source} endpoint returned error status"))?
            .bytes()
            .await
            .with_context(|| format!("failed to read {source} response body"))?;

        response_store::save(source, &bytes).await;

        let payload = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(body) => SensorPayload::from_json(&body),
            Err(e) => {
                warn!(url = %url, error = %e, "unparseable sensor body, treating as empty");
                SensorPayload::default()
            }
        };

        Ok(payload)
    }
}

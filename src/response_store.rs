/// Saves raw sensor endpoint response bytes to
/// `responses/{source}/{timestamp}.json` for offline analysis.
///
/// Errors are logged and swallowed — saving is best-effort and must never
/// interrupt normal application flow.
use tokio::fs;
use tracing::warn;

/// Write `bytes` to `responses/{source}/{timestamp}.json`.
///
/// - `source`: used as the sub-directory name, e.g. `"device"` or `"cloud"`.
/// - `bytes`: the raw HTTP response body as received from the endpoint.
pub async fn save(source: &str, bytes: &[u8]) {
    let ts = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let dir = format!("responses/{source}");
    let path = format!("{dir}/{ts}.json");

    if let Err(e) = fs::create_dir_all(&dir).await {
        warn!(path = %path, error = %e, "response_store: failed to create directory");
        return;
    }

    // Pretty-print the JSON if valid; fall back to raw bytes otherwise.
    let content = match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(v) => match serde_json::to_vec_pretty(&v) {
            Ok(pretty) => pretty,
            Err(_) => bytes.to_vec(),
        },
        Err(_) => bytes.to_vec(),
    };

    if let Err(e) = fs::write(&path, &content).await {
        warn!(path = %path, error = %e, "response_store: failed to write response file");
    } else {
        tracing::debug!(path = %path, bytes = content.len(), "response_store: saved");
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// One normalized set of measurements as received from the device, the
/// cloud copy, or an ingestion push. Absent and unparseable fields are
/// `None`; a genuine zero is `Some(0.0)` — the two are never conflated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorPayload {
    pub ph: Option<f64>,
    pub turbidity: Option<f64>,
    pub temperature: Option<f64>,
    pub tds: Option<f64>,
}

impl SensorPayload {
    /// True when no field carries a value. Empty payloads are rejected at
    /// every ingestion boundary.
    pub fn is_empty(&self) -> bool {
        self.ph.is_none()
            && self.turbidity.is_none()
            && self.temperature.is_none()
            && self.tds.is_none()
    }

    /// Extract a payload from a JSON body.
    ///
    /// The device and its cloud mirror emit three shapes: a bare object,
    /// `{"latestData": {...}}`, and `{"data": {...}}`. All are accepted;
    /// unknown wrappers fall through to the bare interpretation.
    pub fn from_json(body: &Value) -> Self {
        let inner = body
            .get("latestData")
            .or_else(|| body.get("data"))
            .filter(|v| v.is_object())
            .unwrap_or(body);

        Self {
            ph: parse_field(inner.get("ph")),
            turbidity: parse_field(inner.get("turbidity")),
            temperature: parse_field(inner.get("temperature")),
            tds: parse_field(inner.get("tds")),
        }
    }

    /// Round each field to the precision the dashboard displays and saves:
    /// pH to 2 decimals, turbidity and temperature to 1, TDS to whole ppm.
    pub fn normalized(self) -> Self {
        Self {
            ph: self.ph.map(|v| round_to(v, 2)),
            turbidity: self.turbidity.map(|v| round_to(v, 1)),
            temperature: self.temperature.map(|v| round_to(v, 1)),
            tds: self.tds.map(|v| round_to(v, 0)),
        }
    }
}

impl From<&crate::db::models::Reading> for SensorPayload {
    fn from(r: &crate::db::models::Reading) -> Self {
        Self {
            ph: r.ph,
            turbidity: r.turbidity,
            temperature: r.temperature,
            tds: r.tds,
        }
    }
}

/// Coerce a single JSON field to a measurement value.
///
/// Numbers pass through; numeric strings (the device firmware sends both)
/// are parsed. Anything else — null, `"N/A"`, objects — is treated as
/// absent. `0` and `"0"` are valid measurements and map to `Some(0.0)`.
fn parse_field(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_numeric_body() {
        let p = SensorPayload::from_json(&json!({
            "ph": 7.2, "turbidity": 3.5, "temperature": 28.0, "tds": 245
        }));
        assert_eq!(p.ph, Some(7.2));
        assert_eq!(p.turbidity, Some(3.5));
        assert_eq!(p.temperature, Some(28.0));
        assert_eq!(p.tds, Some(245.0));
    }

    #[test]
    fn string_values_are_parsed() {
        let p = SensorPayload::from_json(&json!({ "ph": "7.25", "tds": " 310 " }));
        assert_eq!(p.ph, Some(7.25));
        assert_eq!(p.tds, Some(310.0));
        assert_eq!(p.turbidity, None);
    }

    #[test]
    fn zero_string_is_a_value_not_missing() {
        let p = SensorPayload::from_json(&json!({
            "ph": "0", "turbidity": null, "temperature": null, "tds": null
        }));
        assert_eq!(p.ph, Some(0.0));
        assert!(!p.is_empty());
    }

    #[test]
    fn zero_number_is_a_value_not_missing() {
        let p = SensorPayload::from_json(&json!({ "tds": 0 }));
        assert_eq!(p.tds, Some(0.0));
    }

    #[test]
    fn not_available_marker_is_absent() {
        let p = SensorPayload::from_json(&json!({
            "ph": "N/A", "turbidity": "N/A", "temperature": "N/A", "tds": "N/A"
        }));
        assert!(p.is_empty());
    }

    #[test]
    fn latest_data_wrapper_is_unwrapped() {
        let p = SensorPayload::from_json(&json!({ "latestData": { "ph": 6.9 } }));
        assert_eq!(p.ph, Some(6.9));
    }

    #[test]
    fn data_wrapper_is_unwrapped() {
        let p = SensorPayload::from_json(&json!({ "data": { "temperature": "26.4" } }));
        assert_eq!(p.temperature, Some(26.4));
    }

    #[test]
    fn non_object_wrapper_falls_through() {
        // "data" holding a string is not a payload wrapper.
        let p = SensorPayload::from_json(&json!({ "data": "nope", "ph": 7.0 }));
        assert_eq!(p.ph, Some(7.0));
    }

    #[test]
    fn empty_object_is_empty() {
        assert!(SensorPayload::from_json(&json!({})).is_empty());
    }

    #[test]
    fn normalized_rounds_per_field() {
        let p = SensorPayload {
            ph: Some(7.256),
            turbidity: Some(3.44),
            temperature: Some(27.95),
            tds: Some(245.6),
        }
        .normalized();
        assert_eq!(p.ph, Some(7.26));
        assert_eq!(p.turbidity, Some(3.4));
        assert_eq!(p.temperature, Some(28.0));
        assert_eq!(p.tds, Some(246.0));
    }

    #[test]
    fn normalized_keeps_zero() {
        let p = SensorPayload { ph: Some(0.0), ..Default::default() }.normalized();
        assert_eq!(p.ph, Some(0.0));
    }
}

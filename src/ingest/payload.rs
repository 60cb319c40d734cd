/// Device reading payloads.
///
/// Field devices post flat JSON objects:
///
/// ```json
/// { "plant_id": "hospital_central", "pressure_bar": 6.1, "temperature_c": 29.4,
///   "purity_pct": "94.8", "flow_nm3h": 11.2, "operating_hours": 15230,
///   "mode": "Production", "alarm": false, "alarm_message": "" }
/// ```
///
/// Every telemetry field is optional. Some firmware sends numbers as JSON
/// strings, so numeric fields accept either; an empty string counts as
/// missing. Unknown keys are ignored.

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::MonitorError;
use crate::model::{Telemetry, TelemetryUpdate, DEFAULT_MODE};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReadingPayload {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pressure_bar: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temperature_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub purity_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub flow_nm3h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub operating_hours: Option<f64>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub alarm: Option<bool>,
    #[serde(default)]
    pub alarm_message: Option<String>,
    /// Display name reported by the device. Overwrites the stored name.
    #[serde(default)]
    pub name: Option<String>,
}

impl ReadingPayload {
    /// Apply defaults and validate numeric fields.
    ///
    /// Missing numbers become 0, a missing or blank mode becomes
    /// `"Unknown"`, a missing alarm flag becomes `false`.
    pub fn resolve(&self) -> Result<TelemetryUpdate, MonitorError> {
        let telemetry = Telemetry {
            pressure_bar: finite("pressure_bar", self.pressure_bar)?,
            temperature_c: finite("temperature_c", self.temperature_c)?,
            purity_pct: finite("purity_pct", self.purity_pct)?,
            flow_nm3h: finite("flow_nm3h", self.flow_nm3h)?,
            operating_hours: finite("operating_hours", self.operating_hours)?,
            mode: non_blank(&self.mode).unwrap_or_else(|| DEFAULT_MODE.to_string()),
            alarm: self.alarm.unwrap_or(false),
            alarm_message: self.alarm_message.clone().unwrap_or_default(),
        };

        Ok(TelemetryUpdate {
            name: non_blank(&self.name),
            telemetry,
        })
    }
}

/// One element of a batch, or the body of a single-reading POST.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BatchEntry {
    #[serde(default)]
    pub plant_id: Option<String>,
    #[serde(flatten)]
    pub reading: ReadingPayload,
}

impl BatchEntry {
    pub fn new(plant_id: &str, reading: ReadingPayload) -> Self {
        Self {
            plant_id: Some(plant_id.to_string()),
            reading,
        }
    }

    /// Parse a JSON value, reporting malformed input as a validation error.
    pub fn from_json(value: serde_json::Value) -> Result<Self, MonitorError> {
        serde_json::from_value(value).map_err(|e| MonitorError::validation(format!("invalid reading: {}", e)))
    }
}

fn finite(field: &str, value: Option<f64>) -> Result<f64, MonitorError> {
    match value {
        None => Ok(0.0),
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(MonitorError::validation(format!("{} must be a finite number, got {}", field, v))),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(v)) => Ok(Some(v)),
        Some(NumberOrText::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("'{}' is not a number", s)))
        }
    }
}

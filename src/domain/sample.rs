// Telemetry sample domain models
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One device reading as received from the telemetry collaborator.
///
/// Power fields that arrive as anything other than a JSON number are kept as
/// `NaN` so the normalizer can reject the sample instead of reading zero.
/// Text fields that are not JSON strings read as absent, so one odd sample
/// never fails the batch it came in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(
        default,
        rename = "deviceId",
        alias = "device_id",
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub sim_ts: Option<String>,
    #[serde(default = "missing_power", deserialize_with = "lenient_power")]
    pub p_actual_kw: f64,
    #[serde(default, deserialize_with = "lenient_optional_power")]
    pub p_setpoint_kw: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_power", skip_serializing_if = "Option::is_none")]
    pub soc: Option<f64>,
}

impl RawSample {
    pub fn new(timestamp: Option<String>, p_actual_kw: f64, p_setpoint_kw: Option<f64>) -> Self {
        Self {
            device_id: None,
            timestamp,
            sim_ts: None,
            p_actual_kw,
            p_setpoint_kw,
            soc: None,
        }
    }

    pub fn for_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_sim_ts(mut self, sim_ts: impl Into<String>) -> Self {
        self.sim_ts = Some(sim_ts.into());
        self
    }

    pub fn with_soc(mut self, soc: f64) -> Self {
        self.soc = Some(soc);
        self
    }

    /// `timestamp` if present, otherwise `sim_ts`. Empty strings count as absent.
    pub fn resolved_timestamp(&self) -> Option<&str> {
        self.timestamp
            .as_deref()
            .filter(|ts| !ts.is_empty())
            .or_else(|| self.sim_ts.as_deref().filter(|ts| !ts.is_empty()))
    }
}

/// One chart-ready point produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    #[serde(rename = "tsIso")]
    pub ts_iso: String,
    pub p_actual_kw: f64,
    pub setpoint_plot_kw: Option<f64>,
}

impl NormalizedPoint {
    pub fn new(ts_iso: String, p_actual_kw: f64, setpoint_plot_kw: Option<f64>) -> Self {
        Self {
            ts_iso,
            p_actual_kw,
            setpoint_plot_kw,
        }
    }
}

fn missing_power() -> f64 {
    f64::NAN
}

fn lenient_power<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or(f64::NAN))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

fn lenient_optional_power<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        other => Some(other.as_f64().unwrap_or(f64::NAN)),
    })
}

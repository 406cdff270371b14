// Wire shapes for telemetry coming from the platform API
use crate::domain::sample::RawSample;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::IgnoredAny;
use serde::Deserialize;

/// Telemetry arrives either flat (dashboard API, simulator) or wrapped in the
/// field agent's message envelope. Anything else is kept as an unreadable
/// entry so the rest of the batch still parses.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireSample {
    Envelope(AgentEnvelope),
    Flat(RawSample),
    Unreadable(IgnoredAny),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEnvelope {
    pub device_id: String,
    pub timestamp_ms: i64,
    pub payload: AgentPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentPayload {
    pub readings: AgentReadings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReadings {
    #[serde(default)]
    pub power_kw: Option<serde_json::Value>,
    #[serde(default)]
    pub soc: Option<f64>,
}

impl From<WireSample> for RawSample {
    fn from(wire: WireSample) -> Self {
        match wire {
            WireSample::Flat(sample) => sample,
            WireSample::Unreadable(_) => RawSample::new(None, f64::NAN, None),
            WireSample::Envelope(envelope) => {
                let timestamp = DateTime::<Utc>::from_timestamp_millis(envelope.timestamp_ms)
                    .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true));
                let power = envelope
                    .payload
                    .readings
                    .power_kw
                    .and_then(|v| v.as_f64())
                    .unwrap_or(f64::NAN);

                RawSample {
                    device_id: Some(envelope.device_id),
                    timestamp,
                    sim_ts: None,
                    p_actual_kw: power,
                    p_setpoint_kw: None,
                    soc: envelope.payload.readings.soc,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::SampleFault;
    use crate::domain::normalizer::normalize_detailed;

    #[test]
    fn test_agent_envelope() {
        let json = r#"{
            "v": 1,
            "messageType": "telemetry",
            "messageId": "0b7c",
            "deviceId": "pi-der-001",
            "deviceType": "battery",
            "timestampMs": 1714564805000,
            "sentAtMs": 1714564805000,
            "source": "pi-agent",
            "payload": {
                "readings": {"powerKw": 1.25, "soc": 48.5},
                "status": {"online": true},
                "siteId": "home-site",
                "feederId": "home-site"
            }
        }"#;

        let sample: RawSample = serde_json::from_str::<WireSample>(json).unwrap().into();
        assert_eq!(sample.device_id.as_deref(), Some("pi-der-001"));
        assert_eq!(sample.timestamp.as_deref(), Some("2024-05-01T12:00:05.000Z"));
        assert_eq!(sample.p_actual_kw, 1.25);
        assert_eq!(sample.p_setpoint_kw, None);
        assert_eq!(sample.soc, Some(48.5));
    }

    #[test]
    fn test_flat_simulator_sample() {
        let json = r#"{
            "deviceId": "ev-001",
            "type": "ev",
            "timestamp": "2024-05-01T12:00:05",
            "p_actual_kw": 3.1,
            "p_setpoint_kw": 3.6,
            "soc": 0.61,
            "site_id": "house-01",
            "p_max_kw": 7.2,
            "priority": 3,
            "sim_ts": "2024-05-01T12:00:05",
            "battery_kwh": 60.0
        }"#;

        let sample: RawSample = serde_json::from_str::<WireSample>(json).unwrap().into();
        assert_eq!(sample.device_id.as_deref(), Some("ev-001"));
        assert_eq!(sample.p_setpoint_kw, Some(3.6));
        assert_eq!(sample.sim_ts.as_deref(), Some("2024-05-01T12:00:05"));
    }

    #[test]
    fn test_bad_entries_do_not_fail_the_batch() {
        let json = r#"[
            {"deviceId": "ev-001", "timestamp": "2024-05-01T12:00:00Z", "p_actual_kw": 3.0},
            {"deviceId": "ev-001", "timestamp": 1714564805, "p_actual_kw": 4.0},
            null,
            {"deviceId": "ev-001", "timestamp": "2024-05-01T12:00:10Z", "p_actual_kw": 5.0}
        ]"#;

        let samples: Vec<RawSample> = serde_json::from_str::<Vec<WireSample>>(json)
            .unwrap()
            .into_iter()
            .map(RawSample::from)
            .collect();
        assert_eq!(samples.len(), 4);

        let series = normalize_detailed(&samples, None);
        let actuals: Vec<f64> = series.points.iter().map(|p| p.p_actual_kw).collect();
        assert_eq!(actuals, vec![3.0, 5.0]);
        assert_eq!(
            series.faults,
            vec![
                SampleFault::MissingTimestamp { index: 1 },
                SampleFault::MissingTimestamp { index: 2 },
            ]
        );
    }

    #[test]
    fn test_envelope_without_power_is_malformed() {
        let json = r#"{"deviceId": "pi-der-001", "timestampMs": 1714564805000, "payload": {"readings": {}}}"#;

        let sample: RawSample = serde_json::from_str::<WireSample>(json).unwrap().into();
        assert!(sample.p_actual_kw.is_nan());
    }
}

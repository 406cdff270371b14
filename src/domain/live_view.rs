// Live metrics view - the snapshot published to dashboard consumers
use super::device::{Device, DeviceCatalog, DeviceType};
use super::sample::NormalizedPoint;
use super::tracking::DeviceTrackingRecord;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStage {
    Catalog,
    Telemetry,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{stage:?} fetch failed: {message}")]
pub struct FetchFailure {
    pub stage: FetchStage,
    pub message: String,
}

impl FetchFailure {
    pub fn new(stage: FetchStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSummary {
    pub feeder_count: usize,
    pub device_count: usize,
    pub reporting_count: usize,
    pub physical_count: usize,
    pub simulated_count: usize,
    pub total_p_max_kw: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PowerByType {
    pub pv: f64,
    pub battery: f64,
    pub ev: f64,
    pub other: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedTotals {
    pub total_actual_kw: f64,
    pub total_setpoint_kw: f64,
    pub by_type: PowerByType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthIndicator {
    pub status: HealthStatus,
    pub reporting_ratio: f64,
    pub mean_tracking_error_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSeries {
    pub device_id: String,
    pub feeder_id: String,
    pub points: Vec<NormalizedPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMetricsView {
    pub feeder_id: Option<String>,
    pub summary: Option<FleetSummary>,
    pub devices: Vec<Device>,
    pub health: Option<HealthIndicator>,
    pub history: Vec<DeviceSeries>,
    pub tracking: Vec<DeviceTrackingRecord>,
    pub aggregated: Option<AggregatedTotals>,
    pub loading: bool,
    pub error: Option<FetchFailure>,
    pub refreshed_at: Option<String>,
}

impl LiveMetricsView {
    pub fn idle(feeder_id: Option<String>) -> Self {
        Self {
            feeder_id,
            ..Self::default()
        }
    }

    /// Same data, flagged as refreshing.
    pub fn loading(&self) -> Self {
        Self {
            loading: true,
            ..self.clone()
        }
    }

    /// Keep the last good data and surface the failure.
    pub fn errored(&self, failure: FetchFailure) -> Self {
        Self {
            loading: false,
            error: Some(failure),
            ..self.clone()
        }
    }

    /// Project this snapshot onto another feeder filter.
    ///
    /// Entries outside the new feeder are removed and the fleet rollups are
    /// cleared until the next refresh recomputes them.
    pub fn refiltered(&self, feeder_id: Option<String>) -> Self {
        let keep = |id: &str| feeder_id.as_deref().is_none_or(|f| f == id);

        Self {
            devices: self.devices.iter().filter(|d| keep(&d.feeder_id)).cloned().collect(),
            tracking: self.tracking.iter().filter(|t| keep(&t.feeder_id)).cloned().collect(),
            history: self.history.iter().filter(|h| keep(&h.feeder_id)).cloned().collect(),
            summary: None,
            health: None,
            aggregated: None,
            loading: true,
            error: None,
            refreshed_at: None,
            feeder_id,
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.loading && (self.refreshed_at.is_some() || self.error.is_some())
    }
}

pub fn summarize(
    catalog: &DeviceCatalog,
    feeder_id: Option<&str>,
    devices: &[Device],
    tracking: &[DeviceTrackingRecord],
) -> FleetSummary {
    FleetSummary {
        feeder_count: catalog.feeder_count(feeder_id),
        device_count: devices.len(),
        reporting_count: tracking.iter().filter(|t| t.is_reporting()).count(),
        physical_count: devices.iter().filter(|d| d.is_physical).count(),
        simulated_count: devices.iter().filter(|d| d.is_simulated).count(),
        total_p_max_kw: devices.iter().map(|d| d.p_max_kw).sum(),
    }
}

pub fn aggregate(tracking: &[DeviceTrackingRecord]) -> AggregatedTotals {
    let mut by_type = PowerByType::default();
    for record in tracking {
        let actual = record.last_actual_kw.unwrap_or(0.0);
        match record.device_type {
            DeviceType::Pv => by_type.pv += actual,
            DeviceType::Battery => by_type.battery += actual,
            DeviceType::Ev => by_type.ev += actual,
            DeviceType::Other => by_type.other += actual,
        }
    }

    AggregatedTotals {
        total_actual_kw: tracking.iter().filter_map(|t| t.last_actual_kw).sum(),
        total_setpoint_kw: tracking.iter().filter_map(|t| t.last_setpoint_kw).sum(),
        by_type,
    }
}

/// Derive the feeder health indicator.
///
/// Tracking error is compared relative to each device's rated power; devices
/// without a rating or without setpoint history are left out of the mean.
pub fn assess_health(
    devices: &[Device],
    tracking: &[DeviceTrackingRecord],
    tolerance: f64,
) -> HealthIndicator {
    if tracking.is_empty() {
        return HealthIndicator {
            status: HealthStatus::Unknown,
            reporting_ratio: 0.0,
            mean_tracking_error_ratio: None,
        };
    }

    let reporting = tracking.iter().filter(|t| t.is_reporting()).count();
    let reporting_ratio = reporting as f64 / tracking.len() as f64;

    let ratios: Vec<f64> = tracking
        .iter()
        .filter_map(|t| {
            let p_max = devices.iter().find(|d| d.id == t.device_id)?.p_max_kw;
            let error = t.avg_abs_error?;
            (p_max > 0.0).then(|| error / p_max)
        })
        .collect();
    let mean_tracking_error_ratio =
        (!ratios.is_empty()).then(|| ratios.iter().sum::<f64>() / ratios.len() as f64);

    let status = if reporting_ratio < 0.5 {
        HealthStatus::Critical
    } else if reporting < tracking.len() || mean_tracking_error_ratio.is_some_and(|r| r > tolerance) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthIndicator {
        status,
        reporting_ratio,
        mean_tracking_error_ratio,
    }
}

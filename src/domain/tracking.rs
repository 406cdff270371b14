// Per-device setpoint tracking
use super::device::{Device, DeviceType};
use super::error::SampleFault;
use super::normalizer::{normalize_detailed, NormalizedSeries};
use super::sample::{NormalizedPoint, RawSample};
use serde::{Deserialize, Serialize};

/// Retained, already-normalized telemetry for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingWindow {
    points: Vec<NormalizedPoint>,
    soc: Option<f64>,
    capacity: usize,
}

impl TrackingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: Vec::new(),
            soc: None,
            capacity,
        }
    }

    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }

    pub fn latest(&self) -> Option<&NormalizedPoint> {
        self.points.last()
    }

    pub fn raw_soc(&self) -> Option<f64> {
        self.soc
    }

    /// Fold a fetched batch into the window.
    ///
    /// Samples not newer than the newest retained point are skipped, so
    /// overlapping pages never double count. Returned faults index into `samples`.
    pub fn merge(&mut self, samples: &[RawSample]) -> Vec<SampleFault> {
        let newest = self.points.last().map(|p| p.ts_iso.clone());
        let (fresh_index, fresh): (Vec<usize>, Vec<RawSample>) = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| match (&newest, s.resolved_timestamp()) {
                (Some(newest), Some(ts)) => ts > newest.as_str(),
                _ => true,
            })
            .map(|(i, s)| (i, s.clone()))
            .unzip();

        if fresh.is_empty() {
            return Vec::new();
        }

        let latest_soc = fresh
            .iter()
            .filter(|s| s.soc.is_some_and(f64::is_finite))
            .filter_map(|s| s.resolved_timestamp().map(|ts| (ts, s.soc)))
            .max_by(|a, b| a.0.cmp(b.0))
            .and_then(|(_, soc)| soc);
        if latest_soc.is_some() {
            self.soc = latest_soc;
        }

        // Retained points are already in kW; only the fresh batch is unit-corrected.
        let NormalizedSeries { mut points, faults } = normalize_detailed(&fresh, None);
        let carried = self.latest().and_then(|p| p.setpoint_plot_kw);
        for point in points.iter_mut().take_while(|p| p.setpoint_plot_kw.is_none()) {
            point.setpoint_plot_kw = carried;
        }

        self.points.extend(points);
        if self.points.len() > self.capacity {
            self.points.drain(..self.points.len() - self.capacity);
        }

        faults
            .into_iter()
            .map(|fault| match fault {
                SampleFault::MissingTimestamp { index } => SampleFault::MissingTimestamp {
                    index: fresh_index[index],
                },
                SampleFault::NonNumeric { index, field } => SampleFault::NonNumeric {
                    index: fresh_index[index],
                    field,
                },
            })
            .collect()
    }

    /// Mean |actual - setpoint| over the newest `window` points that have a setpoint.
    pub fn avg_abs_error(&self, window: usize) -> Option<f64> {
        let start = self.points.len().saturating_sub(window);
        let errors: Vec<f64> = self.points[start..]
            .iter()
            .filter_map(|p| p.setpoint_plot_kw.map(|sp| (p.p_actual_kw - sp).abs()))
            .collect();

        if errors.is_empty() {
            None
        } else {
            Some(errors.iter().sum::<f64>() / errors.len() as f64)
        }
    }

    /// Chart series for this device, newest `max_points` entries.
    pub fn series(&self, max_points: usize) -> Vec<NormalizedPoint> {
        let start = self.points.len().saturating_sub(max_points);
        self.points[start..].to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTrackingRecord {
    pub device_id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub site_id: String,
    pub feeder_id: String,
    pub avg_abs_error: Option<f64>,
    pub last_setpoint_kw: Option<f64>,
    pub last_actual_kw: Option<f64>,
    pub priority: Option<i32>,
    pub soc: Option<f64>,
    pub is_physical: bool,
}

impl DeviceTrackingRecord {
    pub fn build(device: &Device, window: Option<&TrackingWindow>, tracking_window: usize) -> Self {
        let latest = window.and_then(TrackingWindow::latest);
        let soc = if device.device_type.has_storage() {
            window.and_then(TrackingWindow::raw_soc).map(soc_fraction)
        } else {
            None
        };

        Self {
            device_id: device.id.clone(),
            device_type: device.device_type,
            site_id: device.site_id.clone(),
            feeder_id: device.feeder_id.clone(),
            avg_abs_error: window.and_then(|w| w.avg_abs_error(tracking_window)),
            last_setpoint_kw: latest.and_then(|p| p.setpoint_plot_kw),
            last_actual_kw: latest.map(|p| p.p_actual_kw),
            priority: device.priority,
            soc,
            is_physical: device.is_physical,
        }
    }

    pub fn is_reporting(&self) -> bool {
        self.last_actual_kw.is_some()
    }
}

/// Field agents report 0-100, the simulator 0-1. Always expose a fraction.
fn soc_fraction(raw: f64) -> f64 {
    let fraction = if raw > 1.0 { raw / 100.0 } else { raw };
    fraction.clamp(0.0, 1.0)
}

// Series normalization - raw samples to chart-ready points
use super::error::SampleFault;
use super::sample::{NormalizedPoint, RawSample};

/// Magnitudes at or above this are treated as watts and scaled to kilowatts.
pub const WATT_SCALE_THRESHOLD_KW: f64 = 1000.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSeries {
    pub points: Vec<NormalizedPoint>,
    pub faults: Vec<SampleFault>,
}

/// Sort, unit-correct and forward-fill a batch of samples.
///
/// `max_points` keeps only the newest entries; `None` keeps everything.
/// Malformed samples are dropped. Use [`normalize_detailed`] to see which.
pub fn normalize(samples: &[RawSample], max_points: Option<usize>) -> Vec<NormalizedPoint> {
    normalize_detailed(samples, max_points).points
}

pub fn normalize_detailed(samples: &[RawSample], max_points: Option<usize>) -> NormalizedSeries {
    let mut faults = Vec::new();
    let mut resolved: Vec<(&str, f64, Option<f64>)> = Vec::with_capacity(samples.len());

    for (index, sample) in samples.iter().enumerate() {
        let Some(ts) = sample.resolved_timestamp() else {
            faults.push(SampleFault::MissingTimestamp { index });
            continue;
        };
        if !sample.p_actual_kw.is_finite() {
            faults.push(SampleFault::NonNumeric {
                index,
                field: "p_actual_kw",
            });
            continue;
        }
        if sample.p_setpoint_kw.is_some_and(|sp| !sp.is_finite()) {
            faults.push(SampleFault::NonNumeric {
                index,
                field: "p_setpoint_kw",
            });
            continue;
        }

        resolved.push((
            ts,
            to_kilowatts(sample.p_actual_kw),
            sample.p_setpoint_kw.map(to_kilowatts),
        ));
    }

    // Vec::sort_by is stable, equal timestamps keep arrival order
    resolved.sort_by(|a, b| a.0.cmp(b.0));

    let mut carried: Option<f64> = None;
    let mut points: Vec<NormalizedPoint> = resolved
        .into_iter()
        .map(|(ts, actual, setpoint)| {
            if setpoint.is_some() {
                carried = setpoint;
            }
            NormalizedPoint::new(ts.to_string(), actual, carried)
        })
        .collect();

    if let Some(max) = max_points {
        if points.len() > max {
            points.drain(..points.len() - max);
        }
    }

    NormalizedSeries { points, faults }
}

/// Scale a watt-valued reading down to kilowatts; kW readings pass through.
pub fn to_kilowatts(value: f64) -> f64 {
    if value.abs() >= WATT_SCALE_THRESHOLD_KW {
        value / 1000.0
    } else {
        value
    }
}

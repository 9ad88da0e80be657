//! Storage trend fitting
//!
//! Fits a least-squares line to used-bytes over time and projects when the
//! volume fills up at the current rate.

use crate::models::ResourceSnapshot;
use std::time::Duration;

/// Growth below this rate is treated as flat
pub const MIN_GROWTH_BYTES_PER_SEC: f64 = 1024.0;

/// Linear storage trend over the retained window
#[derive(Debug, Clone, PartialEq)]
pub struct StorageTrend {
    /// Growth in bytes per second; negative when storage is being freed
    pub slope_bytes_per_sec: f64,
    pub samples_analyzed: usize,
    /// `None` when the trend is flat or improving
    pub time_to_exhaustion: Option<Duration>,
}

/// Least-squares slope of `(timestamp_secs, value)` points
///
/// Returns `None` with fewer than two points or when all timestamps coincide.
pub fn linear_regression_slope(points: &[(i64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    // Normalize both axes to avoid precision issues at byte-scale values
    let t0 = points[0].0 as f64;
    let y0 = points[0].1;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for (ts, value) in points {
        let x = *ts as f64 - t0;
        let y = value - y0;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return None;
    }

    Some((n * sum_xy - sum_x * sum_y) / denominator)
}

/// Fit the storage trend over snapshots inside `window` of the newest storage reading
pub fn fit_storage_trend(history: &[ResourceSnapshot], window: Duration) -> Option<StorageTrend> {
    let readings: Vec<(i64, u64, u64)> = history
        .iter()
        .filter_map(|s| {
            s.storage
                .map(|storage| (s.captured_at, storage.used_bytes, storage.total_bytes))
        })
        .collect();

    let &(latest_ts, latest_used, latest_total) = readings.last()?;
    let window_start = latest_ts.saturating_sub(window.as_secs() as i64);

    let points: Vec<(i64, f64)> = readings
        .iter()
        .filter(|(ts, _, _)| *ts >= window_start)
        .map(|(ts, used, _)| (*ts, *used as f64))
        .collect();

    let slope = linear_regression_slope(&points)?;

    let remaining = latest_total.saturating_sub(latest_used) as f64;
    let time_to_exhaustion = if slope < MIN_GROWTH_BYTES_PER_SEC {
        None
    } else {
        Duration::try_from_secs_f64(remaining / slope).ok()
    };

    Some(StorageTrend {
        slope_bytes_per_sec: slope,
        samples_analyzed: points.len(),
        time_to_exhaustion,
    })
}

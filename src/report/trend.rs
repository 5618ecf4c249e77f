//! Cross-device trend reduction.

use std::collections::{BTreeMap, HashMap};

use crate::models::{TrendPoint, TrendSeries};

// ---

/// Per-device trends keyed by telemetry key, as fetched from the platform.
pub type DeviceTrends = HashMap<String, TrendSeries>;

/// Sum `key` across devices, bucket by bucket.
///
/// Only timestamps present in at least one device series appear in the
/// result, sorted ascending. Input order does not affect the output.
pub fn aggregate_trend(device_trends: &[DeviceTrends], key: &str) -> TrendSeries {
    // ---
    let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
    for point in device_trends.iter().filter_map(|t| t.get(key)).flatten() {
        *buckets.entry(point.ts).or_insert(0.0) += point.value;
    }
    buckets
        .into_iter()
        .map(|(ts, value)| TrendPoint { ts, value })
        .collect()
}

/// Average `key` across the devices that reported each bucket.
pub fn average_trend(device_trends: &[DeviceTrends], key: &str) -> TrendSeries {
    // ---
    let mut buckets: BTreeMap<i64, (f64, u32)> = BTreeMap::new();
    for point in device_trends.iter().filter_map(|t| t.get(key)).flatten() {
        let slot = buckets.entry(point.ts).or_insert((0.0, 0));
        slot.0 += point.value;
        slot.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(ts, (sum, n))| TrendPoint {
            ts,
            value: round_to(sum / f64::from(n), 1),
        })
        .collect()
}

/// Divide every value by `divisor` and round (Wh → kWh, g → kg).
pub fn scale_series(series: TrendSeries, divisor: f64) -> TrendSeries {
    series
        .into_iter()
        .map(|p| TrendPoint {
            ts: p.ts,
            value: round_to(p.value / divisor, 2),
        })
        .collect()
}

/// Mean and peak bucket value, both rounded to 2 decimals; zeros when empty.
pub fn series_stats(series: &[TrendPoint]) -> (f64, f64) {
    // ---
    if series.is_empty() {
        return (0.0, 0.0);
    }
    let sum: f64 = series.iter().map(|p| p.value).sum();
    let peak = series
        .iter()
        .map(|p| p.value)
        .fold(f64::NEG_INFINITY, f64::max);
    (round_to(sum / series.len() as f64, 2), round_to(peak, 2))
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

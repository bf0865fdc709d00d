//! k-sigma outlier screening.
//!
//! Statistics are computed over the full set before any value is flagged, so
//! the result does not depend on input order and re-running with the same
//! values and `k` gives the same flags. Flagged values stay in the data set.

use std::collections::BTreeSet;

use crate::domain::GridPosition;
use crate::math::RunningStats;

/// Indices of values with `|v - mean| >= k * std` (population std).
///
/// Nothing is flagged when the spread is zero.
pub fn flag_indices(values: &[f64], k: f64) -> Vec<bool> {
    let stats = RunningStats::from_values(values.iter().copied());
    let (Some(mean), Some(std)) = (stats.mean(), stats.std_dev()) else {
        return vec![false; values.len()];
    };
    if !(std > 0.0) {
        return vec![false; values.len()];
    }
    let limit = k * std;
    values
        .iter()
        .map(|v| v.is_finite() && (v - mean).abs() >= limit)
        .collect()
}

/// Grid positions whose value is an outlier for this channel.
pub fn flag_outliers(values: &[(GridPosition, f64)], k: f64) -> BTreeSet<GridPosition> {
    let raw: Vec<f64> = values.iter().map(|(_, v)| *v).collect();
    flag_indices(&raw, k)
        .into_iter()
        .zip(values)
        .filter_map(|(flag, (pos, _))| flag.then_some(*pos))
        .collect()
}

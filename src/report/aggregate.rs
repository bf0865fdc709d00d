//! Force-volume aggregation.
//!
//! `ResultAggregator` folds `CurveResult`s in as they arrive, keeping a running
//! mean/std per channel (Welford). Outlier flags and histograms depend on the
//! whole current set, so they are only produced by `statistics()`, which
//! rebuilds everything from the retained per-position values.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::correct::CurveFeatures;
use crate::domain::{Channel, Confidence, CurveResult, GridPosition};
use crate::math::{RunningStats, linspace};
use crate::report::outliers::flag_outliers;

/// Equal-width histogram over `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` bin edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn from_values(values: &[f64], bins: usize) -> Self {
        let bins = bins.max(1);
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self {
                edges: Vec::new(),
                counts: vec![0; bins],
            };
        }
        let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let edges = linspace(lo, hi, bins + 1);
        let mut counts = vec![0; bins];
        let width = (hi - lo) / bins as f64;
        for v in finite {
            let idx = if width > 0.0 {
                (((v - lo) / width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[idx] += 1;
        }
        Self { edges, counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Snapshot statistics for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatistics {
    pub channel: Channel,
    pub count: usize,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Per-position values in row-major order.
    pub values: Vec<(GridPosition, f64)>,
    pub outliers: BTreeSet<GridPosition>,
    pub histogram: Histogram,
}

impl ChannelStatistics {
    fn build(channel: Channel, values: Vec<(GridPosition, f64)>, k: f64, bins: usize) -> Self {
        let stats = RunningStats::from_values(values.iter().map(|(_, v)| *v));
        let outliers = flag_outliers(&values, k);
        let raw: Vec<f64> = values.iter().map(|(_, v)| *v).collect();
        Self {
            channel,
            count: stats.count(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
            min: stats.min(),
            max: stats.max(),
            histogram: Histogram::from_values(&raw, bins),
            values,
            outliers,
        }
    }

    pub fn value_at(&self, position: GridPosition) -> Option<f64> {
        self.values
            .binary_search_by(|(p, _)| p.cmp(&position))
            .ok()
            .map(|i| self.values[i].1)
    }

    pub fn is_outlier(&self, position: GridPosition) -> bool {
        self.outliers.contains(&position)
    }
}

/// Per-channel statistics of a measurement grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridStatistics {
    pub curves: usize,
    pub succeeded: usize,
    pub low_confidence: usize,
    pub excluded: usize,
    /// Count of results per status code (`ok` included).
    pub status_counts: BTreeMap<String, usize>,
    pub channels: BTreeMap<Channel, ChannelStatistics>,
}

impl GridStatistics {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelStatistics> {
        self.channels.get(&channel)
    }
}

/// Aggregation-relevant summary of one curve result.
#[derive(Debug, Clone, PartialEq)]
struct Entry {
    status: &'static str,
    success: bool,
    low_confidence: bool,
    values: BTreeMap<Channel, f64>,
}

/// Channel values contributed by one result.
///
/// Model-dependent channels need a successful fit at normal confidence;
/// stiffness a successful result; feature channels a located contact.
pub fn channel_values(result: &CurveResult, noise_factor: f64) -> BTreeMap<Channel, f64> {
    let mut out = BTreeMap::new();

    if let Some(fit) = result.fit() {
        if fit.confidence == Confidence::Normal {
            if let Some(e) = fit.effective_modulus {
                out.insert(Channel::Modulus, e);
            }
            if let Some(f) = fit.adhesion_force {
                out.insert(Channel::Adhesion, f);
            }
        }
        if let Some(s) = fit.stiffness {
            out.insert(Channel::Stiffness, s);
        }
    }

    if let Some(curve) = result.curve().filter(|c| c.is_referenced()) {
        let features = CurveFeatures::from_curve(curve, noise_factor);
        for channel in Channel::ALL {
            if let Some(v) = features.channel_value(channel) {
                out.insert(channel, v);
            }
        }
    }

    out.retain(|_, v| v.is_finite());
    out
}

#[derive(Debug, Clone)]
pub struct ResultAggregator {
    outlier_k: f64,
    histogram_bins: usize,
    noise_factor: f64,
    entries: BTreeMap<GridPosition, Entry>,
    running: BTreeMap<Channel, RunningStats>,
    excluded: BTreeSet<GridPosition>,
}

impl ResultAggregator {
    pub fn new(outlier_k: f64, histogram_bins: usize, noise_factor: f64) -> Self {
        Self {
            outlier_k,
            histogram_bins,
            noise_factor,
            entries: BTreeMap::new(),
            running: BTreeMap::new(),
            excluded: BTreeSet::new(),
        }
    }

    pub fn from_config(config: &crate::domain::CorrectionConfig) -> Self {
        Self::new(config.outlier_k, config.histogram_bins, config.contact_noise_factor)
    }

    /// Fold one result in. A result for an already-seen position replaces it.
    pub fn push(&mut self, position: GridPosition, result: &CurveResult) {
        let entry = Entry {
            status: result.status_code(),
            success: result.is_success(),
            low_confidence: result
                .fit()
                .is_some_and(|f| f.confidence == Confidence::Low),
            values: channel_values(result, self.noise_factor),
        };

        let replaced = self.entries.insert(position, entry).is_some();
        if replaced {
            self.rebuild_running();
        } else if !self.excluded.contains(&position) {
            if let Some(entry) = self.entries.get(&position) {
                for (channel, v) in &entry.values {
                    self.running.entry(*channel).or_default().push(*v);
                }
            }
        }
    }

    /// Combine a partial aggregator built on a disjoint set of positions.
    pub fn merge(&mut self, other: ResultAggregator) {
        let overlap = other.entries.keys().any(|p| self.entries.contains_key(p));
        self.excluded.extend(other.excluded);
        self.entries.extend(other.entries);
        if overlap {
            self.rebuild_running();
        } else {
            for (channel, stats) in &other.running {
                self.running.entry(*channel).or_default().merge(stats);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Running statistics over the included positions.
    pub fn running(&self, channel: Channel) -> Option<&RunningStats> {
        self.running.get(&channel)
    }

    pub fn set_outlier_k(&mut self, k: f64) {
        self.outlier_k = k;
    }

    /// Leave these positions out of every channel.
    pub fn exclude(&mut self, positions: impl IntoIterator<Item = GridPosition>) {
        self.excluded.extend(positions);
        self.rebuild_running();
    }

    pub fn include_all(&mut self) {
        self.excluded.clear();
        self.rebuild_running();
    }

    fn rebuild_running(&mut self) {
        self.running.clear();
        for (pos, entry) in &self.entries {
            if self.excluded.contains(pos) {
                continue;
            }
            for (channel, v) in &entry.values {
                self.running.entry(*channel).or_default().push(*v);
            }
        }
    }

    /// Consistent snapshot: per-channel values, moments, outliers and histograms.
    pub fn statistics(&self) -> GridStatistics {
        let mut per_channel: BTreeMap<Channel, Vec<(GridPosition, f64)>> = BTreeMap::new();
        let mut status_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut succeeded = 0;
        let mut low_confidence = 0;

        for (pos, entry) in &self.entries {
            *status_counts.entry(entry.status.to_string()).or_default() += 1;
            if entry.success {
                succeeded += 1;
            }
            if entry.low_confidence {
                low_confidence += 1;
            }
            if self.excluded.contains(pos) {
                continue;
            }
            for (channel, v) in &entry.values {
                per_channel.entry(*channel).or_default().push((*pos, *v));
            }
        }

        let channels = per_channel
            .into_iter()
            .map(|(channel, values)| {
                (
                    channel,
                    ChannelStatistics::build(channel, values, self.outlier_k, self.histogram_bins),
                )
            })
            .collect();

        GridStatistics {
            curves: self.entries.len(),
            succeeded,
            low_confidence,
            excluded: self.excluded.len(),
            status_counts,
            channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::distance::convert_distance;
    use crate::domain::{BaselineLine, FailureReason, FitResult};

    fn success(modulus: f64, stiffness: f64) -> CurveResult {
        let position: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let deflection: Vec<f64> = position.iter().map(|x| 0.5 * (x - 10.0).max(0.0)).collect();
        let baseline = BaselineLine {
            slope: 0.0,
            intercept: 0.0,
            rms: 0.0,
            samples: 2,
        };
        let curve = convert_distance(&position, deflection, 1.0, Some(10), baseline);
        let fit = FitResult {
            model: None,
            effective_modulus: Some(modulus),
            youngs_modulus: None,
            adhesion_force: None,
            adhesion_source: None,
            work_of_adhesion: None,
            stiffness: Some(stiffness),
            residual: Some(0.0),
            bic: None,
            fitted_samples: 10,
            contact_height: Some(10.0),
            confidence: Confidence::Normal,
            quality_warning: None,
        };
        CurveResult::Success { curve, fit }
    }

    fn failure() -> CurveResult {
        CurveResult::Failure {
            reason: FailureReason::FitDidNotConverge {
                detail: "test".to_string(),
            },
            curve: None,
            stiffness: None,
        }
    }

    fn grid_aggregator(moduli: &[f64]) -> ResultAggregator {
        let mut agg = ResultAggregator::new(2.0, 4, 3.0);
        for (i, m) in moduli.iter().enumerate() {
            agg.push(GridPosition::new(0, i), &success(*m, 1.0));
        }
        agg
    }

    #[test]
    fn running_moments_match_snapshot() {
        let agg = grid_aggregator(&[10.0, 10.0, 10.0, 10.0, 100.0]);
        let snapshot = agg.statistics();
        let modulus = snapshot.channel(Channel::Modulus).unwrap();
        let running = agg.running(Channel::Modulus).unwrap();

        assert_eq!(modulus.count, 5);
        assert!((modulus.mean.unwrap() - running.mean().unwrap()).abs() < 1e-12);
        assert!((modulus.std_dev.unwrap() - 36.0).abs() < 1e-12);
        assert!(modulus.is_outlier(GridPosition::new(0, 4)));
        assert_eq!(modulus.value_at(GridPosition::new(0, 4)), Some(100.0));
        assert_eq!(modulus.value_at(GridPosition::new(1, 0)), None);
        assert_eq!(modulus.histogram.total(), 5);
        assert_eq!(modulus.histogram.counts, vec![4, 0, 0, 1]);
    }

    #[test]
    fn failures_are_kept_out_of_model_channels() {
        let mut agg = grid_aggregator(&[1.0, 2.0]);
        agg.push(GridPosition::new(1, 0), &failure());
        let snapshot = agg.statistics();

        assert_eq!(snapshot.curves, 3);
        assert_eq!(snapshot.succeeded, 2);
        assert_eq!(snapshot.status_counts.get("fit_did_not_converge"), Some(&1));
        assert_eq!(snapshot.channel(Channel::Modulus).unwrap().count, 2);
        assert_eq!(snapshot.channel(Channel::ContactHeight).unwrap().count, 2);
    }

    #[test]
    fn reaggregation_with_exclusions_and_new_k() {
        let mut agg = grid_aggregator(&[10.0, 10.0, 10.0, 10.0, 100.0]);
        agg.exclude([GridPosition::new(0, 4)]);
        let snapshot = agg.statistics();
        let modulus = snapshot.channel(Channel::Modulus).unwrap();
        assert_eq!(modulus.count, 4);
        assert_eq!(modulus.mean, Some(10.0));
        assert!(modulus.outliers.is_empty());
        assert_eq!(agg.running(Channel::Modulus).unwrap().count(), 4);

        agg.include_all();
        agg.set_outlier_k(10.0);
        assert!(agg.statistics().channel(Channel::Modulus).unwrap().outliers.is_empty());
    }

    #[test]
    fn merged_partials_equal_sequential_aggregation() {
        let moduli = [3.0, 5.0, 4.0, 8.0, 1.0, 6.0];
        let sequential = grid_aggregator(&moduli);

        let mut left = ResultAggregator::new(2.0, 4, 3.0);
        let mut right = ResultAggregator::new(2.0, 4, 3.0);
        for (i, m) in moduli.iter().enumerate() {
            let target = if i % 2 == 0 { &mut left } else { &mut right };
            target.push(GridPosition::new(0, i), &success(*m, 1.0));
        }
        right.merge(left);

        assert_eq!(right.statistics(), sequential.statistics());
        let a = right.running(Channel::Modulus).unwrap();
        let b = sequential.running(Channel::Modulus).unwrap();
        assert!((a.mean().unwrap() - b.mean().unwrap()).abs() < 1e-12);
    }

    #[test]
    fn replacing_a_position_recomputes() {
        let mut agg = grid_aggregator(&[1.0, 2.0]);
        agg.push(GridPosition::new(0, 1), &success(4.0, 1.0));
        let running = agg.running(Channel::Modulus).unwrap();
        assert_eq!(running.count(), 2);
        assert!((running.mean().unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn histogram_of_constant_values() {
        let h = Histogram::from_values(&[2.0, 2.0, 2.0], 5);
        assert_eq!(h.counts[0], 3);
        assert_eq!(h.edges.len(), 6);
    }
}

//! Shared batch workflow used by every front-end command.
//!
//! validate -> per-curve correction (parallel) -> barrier -> aggregation -> average curve
//!
//! Per-curve work is pure, so curves fan out over rayon with no shared mutable
//! state. Results are collected in input order; aggregation happens once all
//! workers are done, on the calling thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::correct::correct_curve;
use crate::domain::{BatchItem, CorrectionConfig, CurveResult, GridPosition};
use crate::error::AppError;
use crate::report::{AverageCurve, GridStatistics, ResultAggregator, average_curve};

/// Cooperative batch cancellation. Clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// All computed outputs of one batch run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Processed curves in input order. Curves skipped after cancellation are absent.
    pub results: Vec<(GridPosition, CurveResult)>,
    pub statistics: GridStatistics,
    pub average: Option<AverageCurve>,
    pub cancelled: bool,
}

/// Grid resolution of the average curve.
pub const AVERAGE_CURVE_POINTS: usize = 100;

/// Execute the batch pipeline.
///
/// Configuration and every curve's metadata are checked before any curve is
/// processed; a problem there is a single batch-level error.
pub fn run_batch(
    items: &[BatchItem],
    config: &CorrectionConfig,
    cancel: &CancelToken,
) -> Result<RunOutput, AppError> {
    run_batch_with(items, config, cancel, AVERAGE_CURVE_POINTS)
}

pub fn run_batch_with(
    items: &[BatchItem],
    config: &CorrectionConfig,
    cancel: &CancelToken,
    average_points: usize,
) -> Result<RunOutput, AppError> {
    // 1) Eager validation.
    config.validate()?;
    for item in items {
        config.validate_metadata(item.approach.metadata()).map_err(|e| {
            AppError::config(format!("Curve at {}: {}", item.position, e.message()))
        })?;
    }

    // 2) Fan out. `None` marks curves skipped after cancellation.
    let processed: Vec<Option<(GridPosition, CurveResult)>> = items
        .par_iter()
        .map(|item| {
            if cancel.is_cancelled() {
                return None;
            }
            let result = correct_curve(&item.approach, item.retract.as_ref(), config);
            if let Some(reason) = result.failure() {
                debug!("curve {}: {reason}", item.position);
            }
            Some((item.position, result))
        })
        .collect();

    let cancelled = cancel.is_cancelled();
    let results: Vec<(GridPosition, CurveResult)> = processed.into_iter().flatten().collect();
    if cancelled {
        warn!(
            "batch cancelled: {} of {} curves processed",
            results.len(),
            items.len()
        );
    }

    // 3) Barrier passed: aggregate.
    let mut aggregator = ResultAggregator::from_config(config);
    for (position, result) in &results {
        aggregator.push(*position, result);
    }
    let statistics = aggregator.statistics();
    let average = average_curve(results.iter().filter_map(|(_, r)| r.curve()), average_points);

    info!(
        "processed {} curves: {} ok, {} low-confidence, {} failed",
        statistics.curves,
        statistics.succeeded - statistics.low_confidence,
        statistics.low_confidence,
        statistics.curves - statistics.succeeded
    );

    Ok(RunOutput {
        results,
        statistics,
        average,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SyntheticCurve, SyntheticGrid};
    use crate::domain::{Channel, ContactPointMethod, CurveMetadata, ModelSpec, RawCurve, Segment};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn grid(rows: usize, cols: usize) -> Vec<BatchItem> {
        SyntheticGrid {
            rows,
            cols,
            curve: SyntheticCurve {
                samples: 400,
                ..SyntheticCurve::default()
            },
            modulus_spread: 0.0,
            height_amplitude: 0.0,
            with_retract: false,
            seed: 7,
        }
        .generate()
        .unwrap()
    }

    fn config() -> CorrectionConfig {
        CorrectionConfig::default()
    }

    #[test]
    fn results_keep_input_order() {
        init_logger();
        let items = grid(2, 3);
        let out = run_batch(&items, &config(), &CancelToken::new()).unwrap();

        let positions: Vec<GridPosition> = out.results.iter().map(|(p, _)| *p).collect();
        let expected: Vec<GridPosition> = items.iter().map(|i| i.position).collect();
        assert_eq!(positions, expected);
        assert_eq!(out.statistics.curves, 6);
        assert!(!out.cancelled);
    }

    #[test]
    fn uniform_grid_recovers_modulus() {
        init_logger();
        let items = grid(2, 2);
        let out = run_batch(&items, &config(), &CancelToken::new()).unwrap();

        assert_eq!(out.statistics.succeeded, 4);
        let modulus = out.statistics.channel(Channel::Modulus).unwrap();
        let mean = modulus.mean.unwrap();
        assert!((mean - 1e6).abs() / 1e6 < 0.05, "mean E* = {mean}");
        assert!(out.average.is_some());
    }

    #[test]
    fn noisy_grid_recovers_modulus_with_either_method() {
        init_logger();
        let items = SyntheticGrid {
            rows: 3,
            cols: 3,
            curve: SyntheticCurve {
                noise: 1e-10,
                ..SyntheticCurve::default()
            },
            modulus_spread: 0.1,
            height_amplitude: 0.2,
            with_retract: false,
            seed: 42,
        }
        .generate()
        .unwrap();

        for method in [ContactPointMethod::TwoLine, ContactPointMethod::ZeroCrossing] {
            let config = CorrectionConfig {
                contact_method: method,
                ..config()
            };
            let out = run_batch(&items, &config, &CancelToken::new()).unwrap();
            assert_eq!(out.statistics.succeeded, 9, "{method:?}");
            let modulus = out.statistics.channel(Channel::Modulus).unwrap();
            assert_eq!(modulus.count, 9);
            let mean = modulus.mean.unwrap();
            assert!((mean - 1e6).abs() / 1e6 < 0.2, "{method:?}: mean E* = {mean}");
        }
    }

    #[test]
    fn cancelled_batch_processes_nothing() {
        let items = grid(1, 3);
        let cancel = CancelToken::new();
        cancel.clone().cancel();
        let out = run_batch(&items, &config(), &cancel).unwrap();

        assert!(out.cancelled);
        assert!(out.results.is_empty());
        assert_eq!(out.statistics.curves, 0);
    }

    #[test]
    fn bad_metadata_rejects_the_whole_batch() {
        let mut items = grid(1, 2);
        let position = items[1].approach.position().to_vec();
        let deflection = items[1].approach.deflection().to_vec();
        items[1].approach =
            RawCurve::new(Segment::Approach, position, deflection, CurveMetadata::new(-1.0)).unwrap();

        let err = run_batch(&items, &config(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
        assert!(err.message().starts_with("Curve at (0, 1): spring_constant"));
    }

    #[test]
    fn fitting_without_tip_radius_is_rejected_but_off_is_not() {
        let items = grid(1, 1);
        let raw = &items[0].approach;
        let item = BatchItem {
            position: GridPosition::new(0, 0),
            approach: RawCurve::new(
                Segment::Approach,
                raw.position().to_vec(),
                raw.deflection().to_vec(),
                CurveMetadata::new(0.1),
            )
            .unwrap(),
            retract: None,
        };
        let items = vec![item];
        assert!(run_batch(&items, &config(), &CancelToken::new()).is_err());

        let off = CorrectionConfig {
            model: ModelSpec::Off,
            ..config()
        };
        let out = run_batch(&items, &off, &CancelToken::new()).unwrap();
        assert_eq!(out.results.len(), 1);
    }
}

//! Average force curve of a set of located curves.
//!
//! The two halves of a curve are resampled differently: the non-contact part
//! as force over a common displacement grid `[z_min, 0]`, the contact part as
//! displacement over a common force grid `[0, F_max]`. Each grid point then
//! gets a mean and standard deviation across curves.

use serde::Serialize;

use crate::domain::CorrectedCurve;
use crate::math::{RunningStats, interp, linspace, sorted_by_x};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AveragedSegment {
    /// Values of the independent variable.
    pub grid: Vec<f64>,
    pub mean: Vec<f64>,
    pub std_dev: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageCurve {
    pub curves: usize,
    /// Force against displacement before contact.
    pub approach: AveragedSegment,
    /// Displacement against force after contact.
    pub contact: AveragedSegment,
}

/// Average the located curves on `points`-sample grids.
///
/// Returns `None` if no curve has a contact point or the curves share no
/// common range.
pub fn average_curve<'a>(
    curves: impl IntoIterator<Item = &'a CorrectedCurve>,
    points: usize,
) -> Option<AverageCurve> {
    let mut halves = Vec::new();
    for curve in curves {
        let Some(c) = curve.contact_index() else {
            continue;
        };
        let z = curve.displacement();
        let f = curve.force();
        let (free_z, free_f) = sorted_by_x(&z[..=c], &f[..=c]);
        let (contact_f, contact_z) = sorted_by_x(&f[c..], &z[c..]);
        halves.push((free_z, free_f, contact_f, contact_z));
    }
    if halves.is_empty() || points < 2 {
        return None;
    }

    // Common ranges every curve covers.
    let z_min = halves
        .iter()
        .filter_map(|(z, ..)| z.first().copied())
        .fold(f64::NEG_INFINITY, f64::max);
    let f_max = halves
        .iter()
        .filter_map(|(_, _, f, _)| f.last().copied())
        .fold(f64::INFINITY, f64::min);

    let approach = (z_min.is_finite() && z_min < 0.0).then(|| {
        let grid = linspace(z_min, 0.0, points);
        resample(&grid, halves.iter().map(|(z, f, ..)| (z.as_slice(), f.as_slice())))
    });
    let contact = (f_max.is_finite() && f_max > 0.0).then(|| {
        let grid = linspace(0.0, f_max, points);
        resample(&grid, halves.iter().map(|(_, _, f, z)| (f.as_slice(), z.as_slice())))
    });

    let empty = || AveragedSegment {
        grid: Vec::new(),
        mean: Vec::new(),
        std_dev: Vec::new(),
    };
    if approach.is_none() && contact.is_none() {
        return None;
    }

    Some(AverageCurve {
        curves: halves.len(),
        approach: approach.unwrap_or_else(empty),
        contact: contact.unwrap_or_else(empty),
    })
}

fn resample<'a>(grid: &[f64], series: impl Iterator<Item = (&'a [f64], &'a [f64])>) -> AveragedSegment {
    let mut stats = vec![RunningStats::new(); grid.len()];
    for (xs, ys) in series {
        for (g, s) in grid.iter().zip(stats.iter_mut()) {
            if let Some(v) = interp(xs, ys, *g) {
                s.push(v);
            }
        }
    }
    AveragedSegment {
        grid: grid.to_vec(),
        mean: stats.iter().map(|s| s.mean().unwrap_or(f64::NAN)).collect(),
        std_dev: stats.iter().map(|s| s.std_dev().unwrap_or(f64::NAN)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::distance::convert_distance;
    use crate::domain::BaselineLine;

    fn curve(contact: usize, slope: f64) -> CorrectedCurve {
        let position: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let deflection: Vec<f64> = position
            .iter()
            .map(|x| slope * (x - contact as f64).max(0.0))
            .collect();
        let baseline = BaselineLine {
            slope: 0.0,
            intercept: 0.0,
            rms: 0.0,
            samples: 5,
        };
        convert_distance(&position, deflection, 1.0, Some(contact), baseline)
    }

    #[test]
    fn averages_on_common_ranges() {
        let a = curve(20, 1.0);
        let b = curve(30, 2.0);
        let avg = average_curve([&a, &b], 11).unwrap();

        assert_eq!(avg.curves, 2);
        // Approach grid spans the shorter free part.
        assert_eq!(avg.approach.grid[0], -20.0);
        assert!(avg.approach.mean.iter().all(|m| m.abs() < 1e-12));
        // Contact grid ends at the smaller peak force (a: 29, b: 38).
        assert!((avg.contact.grid[10] - 29.0).abs() < 1e-12);
        // At F = 29: a needs z = 29, b needs z = 14.5.
        assert!((avg.contact.mean[10] - 21.75).abs() < 1e-12);
        assert!((avg.contact.std_dev[10] - 7.25).abs() < 1e-12);
    }

    #[test]
    fn unlocated_curves_are_skipped() {
        let position: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let baseline = BaselineLine {
            slope: 0.0,
            intercept: 0.0,
            rms: 0.0,
            samples: 2,
        };
        let free = convert_distance(&position, vec![0.0; 10], 1.0, None, baseline);
        assert!(average_curve([&free], 10).is_none());
    }
}

//! Incremental straight-line regression over growing windows.
//!
//! The contact locator fits a line to every trailing window `[start, n)` of a
//! curve. Accumulating the sums one sample at a time from the end makes the whole
//! scan linear in the number of samples instead of quadratic.
//!
//! Sums are kept relative to an anchor point (the first sample pushed) so that
//! the usual `Σx² - (Σx)²/n` cancellation stays small for long, offset curves.

use crate::math::LineFit;

#[derive(Debug, Clone, Default)]
pub struct RegressionSums {
    anchor: Option<(f64, f64)>,
    n: usize,
    sx: f64,
    sy: f64,
    sxx: f64,
    sxy: f64,
    syy: f64,
}

impl RegressionSums {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: f64, y: f64) {
        let (ax, ay) = *self.anchor.get_or_insert((x, y));
        let dx = x - ax;
        let dy = y - ay;
        self.n += 1;
        self.sx += dx;
        self.sy += dy;
        self.sxx += dx * dx;
        self.sxy += dx * dy;
        self.syy += dy * dy;
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Least squares line through the samples pushed so far.
    pub fn line(&self) -> Option<LineFit> {
        let (ax, ay) = self.anchor?;
        if self.n < 2 {
            return None;
        }
        let nf = self.n as f64;
        let cxx = self.sxx - self.sx * self.sx / nf;
        let cxy = self.sxy - self.sx * self.sy / nf;
        let cyy = self.syy - self.sy * self.sy / nf;
        if !(cxx > 0.0) {
            return None;
        }

        let slope = cxy / cxx;
        // Intercept in anchored coordinates, then shifted back.
        let b_local = self.sy / nf - slope * self.sx / nf;
        let intercept = ay + b_local - slope * ax;
        let sse = (cyy - slope * cxy).max(0.0);
        let rms = (sse / nf).sqrt();

        if slope.is_finite() && intercept.is_finite() && rms.is_finite() {
            Some(LineFit {
                slope,
                intercept,
                rms,
            })
        } else {
            None
        }
    }
}

/// Line fits of every trailing window `[start, n)` with at least `min_len` samples.
///
/// Results are ordered from the narrowest window to the widest, i.e. `start`
/// decreasing. Windows whose fit is degenerate are skipped.
pub fn trailing_line_fits(x: &[f64], y: &[f64], min_len: usize) -> Vec<(usize, LineFit)> {
    let n = x.len().min(y.len());
    let min_len = min_len.max(2);
    let mut sums = RegressionSums::new();
    let mut out = Vec::with_capacity(n.saturating_sub(min_len) + 1);

    for start in (0..n).rev() {
        sums.push(x[start], y[start]);
        if sums.len() < min_len {
            continue;
        }
        if let Some(line) = sums.line() {
            out.push((start, line));
        }
    }

    out
}

//! Straight-line least squares.
//!
//! ```text
//! minimize Σ (y_i - a - b x_i)^2
//! ```
//!
//! Solved in closed form on centred data.

/// Result of a straight-line fit `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    /// Root-mean-square residual.
    pub rms: f64,
}

impl LineFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Ordinary least squares line through `(x, y)`.
///
/// Returns `None` for fewer than two samples or when all `x` coincide.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<LineFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mx = x[..n].iter().sum::<f64>() / nf;
    let my = y[..n].iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        sxx += dx * dx;
        sxy += dx * (y[i] - my);
    }
    if !(sxx > 0.0) {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let sse: f64 = (0..n)
        .map(|i| {
            let r = y[i] - (intercept + slope * x[i]);
            r * r
        })
        .sum();
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

//! Mean-variance modelling of log-counts into precision weights.
//!
//! Counts are moved to the log2 counts-per-million scale using the
//! TMM-adjusted effective library sizes. A trend between per-gene mean
//! log-count and the quarter-root residual standard deviation is fit
//! with a rank-window moving mean, then read back at every fitted
//! observation to give each observation a precision weight
//! `1 / sd(fitted)^4`. The heteroscedastic counts can then be analysed
//! with ordinary weighted least squares.

use crate::error::{Result, StatsError};
use crate::lm;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Fraction of genes inside each smoothing window.
const SPAN: f64 = 0.5;
/// Numerical floor for the smoothed square-root standard deviation.
const MIN_SQRT_SD: f64 = 1e-4;

/// Log2-CPM expression values with matching precision weights.
pub struct Voom {
    /// genes x samples, log2 counts per million
    pub log_cpm: DMatrix<f64>,
    /// genes x samples precision weights
    pub weights: DMatrix<f64>,
    /// effective library size per sample (lib size * TMM factor)
    pub effective_lib_sizes: DVector<f64>,
}

/// Transform filtered counts into log2-CPM and per-observation weights
/// for the given design.
pub fn voom(
    counts: &DMatrix<f64>,
    tmm_factors: &DVector<f64>,
    design: &DMatrix<f64>,
) -> Result<Voom> {
    let n_genes = counts.nrows();
    let n_samples = counts.ncols();
    if tmm_factors.len() != n_samples || design.nrows() != n_samples {
        return Err(StatsError::ShapeMismatch {
            reason: "counts, factors, and design disagree on sample count".into(),
        });
    }

    let effective_lib_sizes = DVector::from_iterator(
        n_samples,
        (0..n_samples).map(|j| counts.column(j).sum() * tmm_factors[j]),
    );

    let log_cpm = DMatrix::from_fn(n_genes, n_samples, |i, j| {
        ((counts[(i, j)] + 0.5) / (effective_lib_sizes[j] + 1.0) * 1e6).log2()
    });

    // first-pass unweighted fit per gene
    let ones = DMatrix::from_element(n_genes, n_samples, 1.0);
    let fits = lm::fit_genes(design, &log_cpm, &ones)?;

    // mean log2 count size per gene on the count scale
    let mean_log_lib: f64 = effective_lib_sizes
        .iter()
        .map(|&l| (l + 1.0).log2())
        .sum::<f64>()
        / n_samples as f64;

    let mean_log_count: Vec<f64> = (0..n_genes)
        .map(|g| log_cpm.row(g).sum() / n_samples as f64 + mean_log_lib - (1e6_f64).log2())
        .collect();
    let sqrt_sd: Vec<f64> = fits.iter().map(|f| f.sigma2.sqrt().sqrt()).collect();

    let trend = Trend::fit(&mean_log_count, &sqrt_sd)?;

    // weights from the trend evaluated at every fitted log-count
    let weight_rows: Vec<Vec<f64>> = (0..n_genes)
        .into_par_iter()
        .map(|g| {
            (0..n_samples)
                .map(|j| {
                    let fitted_log_count = fits[g].fitted[j]
                        + (effective_lib_sizes[j] + 1.0).log2()
                        - (1e6_f64).log2();
                    let sd = trend.predict(fitted_log_count).max(MIN_SQRT_SD);
                    1.0 / sd.powi(4)
                })
                .collect()
        })
        .collect();

    let weights =
        DMatrix::from_row_iterator(n_genes, n_samples, weight_rows.into_iter().flatten());

    Ok(Voom {
        log_cpm,
        weights,
        effective_lib_sizes,
    })
}

/// Piecewise-linear mean-variance trend: a moving mean over genes
/// ordered by mean log-count, evaluated by interpolation and clamped at
/// both ends.
pub(crate) struct Trend {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Trend {
    pub(crate) fn fit(x: &[f64], y: &[f64]) -> Result<Self> {
        debug_assert_eq!(x.len(), y.len());
        let n = x.len();
        if n == 0 {
            return Err(StatsError::EmptyInput {
                reason: "cannot fit a mean-variance trend to zero genes".into(),
            });
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(std::cmp::Ordering::Equal));

        let window = ((n as f64 * SPAN).ceil() as usize).clamp(1, n);
        let half = window / 2;

        let mut xs = Vec::with_capacity(n);
        let mut ys = Vec::with_capacity(n);
        for (rank, &idx) in order.iter().enumerate() {
            let lo = rank.saturating_sub(half);
            let hi = (rank + half + 1).min(n);
            let mean = order[lo..hi].iter().map(|&i| y[i]).sum::<f64>() / (hi - lo) as f64;
            xs.push(x[idx]);
            ys.push(mean);
        }

        Ok(Trend { x: xs, y: ys })
    }

    pub(crate) fn predict(&self, at: f64) -> f64 {
        let n = self.x.len();
        if at <= self.x[0] {
            return self.y[0];
        }
        if at >= self.x[n - 1] {
            return self.y[n - 1];
        }
        let mut hi = self.x.partition_point(|&v| v < at);
        if hi == 0 {
            hi = 1;
        }
        let lo = hi - 1;
        let span = self.x[hi] - self.x[lo];
        if span <= 0.0 {
            return self.y[lo];
        }
        let frac = (at - self.x[lo]) / span;
        self.y[lo] * (1.0 - frac) + self.y[hi] * frac
    }
}

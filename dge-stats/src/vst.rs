//! Variance-stabilizing transform for exploratory analysis.
//!
//! Counts are divided by median-of-ratios size factors and passed
//! through the closed-form `2*asinh(sqrt(a*q))` log transform with a
//! common method-of-moments dispersion `a`. Low counts are shrunk
//! toward the mean trend harder than high counts, so the variance of
//! the output is approximately independent of the mean. The result is
//! used for PCA and clustering only, never for the differential test.

use crate::error::{Result, StatsError};

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Size factors plus the transformed matrix.
pub struct Vst {
    pub size_factors: DVector<f64>,
    pub dispersion: f64,
    pub transformed: DMatrix<f64>,
}

const DEFAULT_DISPERSION: f64 = 0.1;
const MIN_DISPERSION: f64 = 1e-3;

/// Apply the variance-stabilizing transform to a raw count matrix
/// (genes x samples).
pub fn variance_stabilize(counts: &DMatrix<f64>) -> Result<Vst> {
    if counts.nrows() == 0 || counts.ncols() == 0 {
        return Err(StatsError::EmptyInput {
            reason: "count matrix has no genes or no samples".into(),
        });
    }

    let size_factors = size_factors(counts)?;

    let n_genes = counts.nrows();
    let n_samples = counts.ncols();
    let mut norm = DMatrix::zeros(n_genes, n_samples);
    for j in 0..n_samples {
        let sf = size_factors[j];
        for i in 0..n_genes {
            norm[(i, j)] = counts[(i, j)] / sf;
        }
    }

    let dispersion = common_dispersion(&norm);

    let rows: Vec<Vec<f64>> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            (0..n_samples)
                .map(|j| stabilize_one(norm[(i, j)], dispersion))
                .collect()
        })
        .collect();

    let transformed =
        DMatrix::from_row_iterator(n_genes, n_samples, rows.into_iter().flatten());

    Ok(Vst {
        size_factors,
        dispersion,
        transformed,
    })
}

/// Median-of-ratios size factors. Only genes observed in every sample
/// enter the per-sample median; if none exist we fall back to library
/// sizes scaled to geometric mean one.
pub fn size_factors(counts: &DMatrix<f64>) -> Result<DVector<f64>> {
    let n_genes = counts.nrows();
    let n_samples = counts.ncols();

    // log geometric mean per gene, over genes with no zero counts
    let mut log_means = Vec::with_capacity(n_genes);
    for i in 0..n_genes {
        let row = counts.row(i);
        if row.iter().all(|&c| c > 0.0) {
            let log_mean = row.iter().map(|&c| c.ln()).sum::<f64>() / n_samples as f64;
            log_means.push((i, log_mean));
        }
    }

    if log_means.is_empty() {
        let lib_sizes: Vec<f64> = (0..n_samples).map(|j| counts.column(j).sum()).collect();
        if lib_sizes.iter().any(|&s| s <= 0.0) {
            return Err(StatsError::EmptyInput {
                reason: "a sample has zero total counts".into(),
            });
        }
        let log_geo = lib_sizes.iter().map(|s| s.ln()).sum::<f64>() / n_samples as f64;
        return Ok(DVector::from_iterator(
            n_samples,
            lib_sizes.iter().map(|s| (s.ln() - log_geo).exp()),
        ));
    }

    let mut factors = DVector::zeros(n_samples);
    for j in 0..n_samples {
        let mut ratios: Vec<f64> = log_means
            .iter()
            .map(|&(i, log_mean)| counts[(i, j)].ln() - log_mean)
            .collect();
        factors[j] = median_in_place(&mut ratios).exp();
    }
    Ok(factors)
}

/// Method-of-moments common dispersion: median over well-expressed genes
/// of `(var - mean) / mean^2`.
fn common_dispersion(norm: &DMatrix<f64>) -> f64 {
    let n_samples = norm.ncols();
    if n_samples < 2 {
        return DEFAULT_DISPERSION;
    }

    let mut dispersions = vec![];
    for i in 0..norm.nrows() {
        let row = norm.row(i);
        let mean = row.sum() / n_samples as f64;
        if mean <= 1.0 {
            continue;
        }
        let var =
            row.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>() / (n_samples as f64 - 1.0);
        let disp = (var - mean) / (mean * mean);
        if disp.is_finite() && disp > 0.0 {
            dispersions.push(disp);
        }
    }

    if dispersions.is_empty() {
        DEFAULT_DISPERSION
    } else {
        median_in_place(&mut dispersions).max(MIN_DISPERSION)
    }
}

fn stabilize_one(q: f64, alpha: f64) -> f64 {
    let q = q.max(0.0);
    let asinh_term = 2.0 * (alpha * q).sqrt().asinh();
    (asinh_term - alpha.ln() - 4.0_f64.ln()) / 2.0_f64.ln()
}

pub(crate) fn median_in_place(values: &mut [f64]) -> f64 {
    debug_assert!(!values.is_empty());
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn size_factors_track_depth() {
        // sample 2 is an exact 2x deeper copy of sample 1
        let counts = DMatrix::from_row_slice(
            3,
            2,
            &[
                10.0, 20.0, //
                50.0, 100.0, //
                100.0, 200.0,
            ],
        );
        let sf = size_factors(&counts).unwrap();
        assert_abs_diff_eq!(sf[1] / sf[0], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn transform_compresses_variance_of_low_counts() {
        let alpha = 0.1;
        // the gap between 1 and 2 shrinks more than the gap between
        // 1000 and 2000 grows relative to log2
        let low_gap = stabilize_one(2.0, alpha) - stabilize_one(1.0, alpha);
        let high_gap = stabilize_one(2000.0, alpha) - stabilize_one(1000.0, alpha);
        assert!(low_gap < 1.0);
        assert_abs_diff_eq!(high_gap, 1.0, epsilon = 0.05);
    }

    #[test]
    fn transform_is_monotone() {
        let alpha = 0.2;
        let values: Vec<f64> = [0.0, 0.5, 1.0, 5.0, 50.0, 500.0]
            .iter()
            .map(|&q| stabilize_one(q, alpha))
            .collect();
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn all_zero_gene_does_not_break_size_factors() {
        let counts = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 10.0, 10.0]);
        let sf = size_factors(&counts).unwrap();
        assert_abs_diff_eq!(sf[0], sf[1], epsilon = 1e-10);
    }
}

//! Trimmed mean of M-values (TMM) normalization factors.
//!
//! Corrects for composition bias between samples: extreme log-ratios
//! (30% each tail) and extreme average intensities (5% each tail) are
//! trimmed before averaging the log-ratios against a reference sample.
//! Factors are centered so their geometric mean is one; the effective
//! library size of sample `j` is `lib_size[j] * factor[j]`.

use crate::error::{Result, StatsError};

use nalgebra::{DMatrix, DVector};
use std::collections::HashSet;

const M_TRIM: f64 = 0.30;
const A_TRIM: f64 = 0.05;

/// TMM normalization factors for a genes x samples count matrix, one
/// factor per sample.
pub fn tmm_factors(counts: &DMatrix<f64>) -> Result<DVector<f64>> {
    let n_samples = counts.ncols();
    if n_samples == 0 || counts.nrows() == 0 {
        return Err(StatsError::EmptyInput {
            reason: "TMM needs a non-empty count matrix".into(),
        });
    }

    let lib_sizes: Vec<f64> = (0..n_samples).map(|j| counts.column(j).sum()).collect();
    if lib_sizes.iter().any(|&s| s <= 0.0) {
        return Err(StatsError::EmptyInput {
            reason: "a sample has zero total counts".into(),
        });
    }

    // per-sample count proportions
    let proportions: Vec<Vec<f64>> = (0..n_samples)
        .map(|j| {
            counts
                .column(j)
                .iter()
                .map(|&c| c / lib_sizes[j])
                .collect()
        })
        .collect();

    let reference = reference_sample(&proportions);

    let mut factors = DVector::from_element(n_samples, 1.0);
    for j in 0..n_samples {
        if j != reference {
            factors[j] = scaling_factor(&proportions[reference], &proportions[j]);
        }
    }

    // center to geometric mean one
    let log_mean = factors.iter().map(|f| f.ln()).sum::<f64>() / n_samples as f64;
    let geo_mean = log_mean.exp();
    for f in factors.iter_mut() {
        *f /= geo_mean;
    }

    Ok(factors)
}

/// The sample whose upper-quartile proportion is closest to the mean
/// upper quartile across samples.
fn reference_sample(proportions: &[Vec<f64>]) -> usize {
    let q3s: Vec<f64> = proportions.iter().map(|p| quantile(p, 0.75)).collect();
    let mean_q3 = q3s.iter().sum::<f64>() / q3s.len() as f64;

    let mut best = 0;
    let mut best_delta = f64::INFINITY;
    for (j, &q3) in q3s.iter().enumerate() {
        let delta = (q3 - mean_q3).abs();
        if delta < best_delta {
            best_delta = delta;
            best = j;
        }
    }
    best
}

/// Quantile with the R/NumPy default interpolation (alpha = beta = 1).
fn quantile(values: &[f64], p: f64) -> f64 {
    debug_assert!(!values.is_empty());
    let mut x = values.to_vec();
    x.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = x.len() as f64;
    let order = (1.0 + (n - 1.0) * p).clamp(1.0, n);
    let j = order.floor();
    let gamma = order - j;
    let i = j as usize;
    if i >= x.len() {
        x[x.len() - 1]
    } else {
        (1.0 - gamma) * x[i - 1] + gamma * x[i.min(x.len() - 1)]
    }
}

fn scaling_factor(reference: &[f64], sample: &[f64]) -> f64 {
    // log-ratios (M) and average log-intensities (A), over genes seen
    // in both samples
    let mut m_values = vec![];
    let mut a_values = vec![];
    for (g, (&r, &s)) in reference.iter().zip(sample.iter()).enumerate() {
        if r <= 0.0 || s <= 0.0 {
            continue;
        }
        m_values.push((g, (s / r).log2()));
        a_values.push((g, (s.log2() + r.log2()) / 2.0));
    }

    if m_values.is_empty() {
        return 1.0;
    }

    m_values.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    a_values.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let kept_a: HashSet<usize> = trim(&a_values, A_TRIM).iter().map(|&(g, _)| g).collect();

    let mut sum = 0.0;
    let mut used = 0usize;
    for &(g, m) in trim(&m_values, M_TRIM) {
        if kept_a.contains(&g) {
            sum += m;
            used += 1;
        }
    }

    if used == 0 {
        1.0
    } else {
        (sum / used as f64).exp2()
    }
}

fn trim<T>(values: &[T], p: f64) -> &[T] {
    let n = values.len() as f64;
    let drop = (n * p).round() as usize;
    if 2 * drop >= values.len() {
        return &values[0..0];
    }
    &values[drop..values.len() - drop]
}

//! Per-gene weighted linear models and condition contrasts.

use crate::error::{Result, StatsError};

use nalgebra::{Cholesky, DMatrix, DVector};
use rayon::prelude::*;

/// Relative singular-value threshold below which the design is
/// considered rank deficient.
const RANK_EPS: f64 = 1e-10;

/// Group-means design matrix: one indicator column per condition level,
/// no intercept. Fails if a level has no samples or the design is
/// otherwise not full rank.
pub fn design_matrix(conditions: &[Box<str>], levels: &[Box<str>]) -> Result<DMatrix<f64>> {
    let n = conditions.len();
    let k = levels.len();
    if n == 0 || k == 0 {
        return Err(StatsError::EmptyInput {
            reason: "design needs samples and condition levels".into(),
        });
    }

    let mut design = DMatrix::zeros(n, k);
    for (i, condition) in conditions.iter().enumerate() {
        let level = levels.iter().position(|l| l == condition).ok_or_else(|| {
            StatsError::DesignRankDeficient {
                reason: format!("condition '{}' is not a known level", condition),
            }
        })?;
        design[(i, level)] = 1.0;
    }

    for (j, level) in levels.iter().enumerate() {
        if design.column(j).sum() == 0.0 {
            return Err(StatsError::DesignRankDeficient {
                reason: format!("condition level '{}' has no samples", level),
            });
        }
    }

    check_full_rank(&design)?;
    Ok(design)
}

/// Verify that the design matrix has full column rank.
pub fn check_full_rank(design: &DMatrix<f64>) -> Result<()> {
    let k = design.ncols();
    let svd = design.clone().svd(false, false);
    let max_sv = svd.singular_values.max();
    let rank = svd
        .singular_values
        .iter()
        .filter(|&&s| s > max_sv * RANK_EPS)
        .count();
    if rank < k {
        return Err(StatsError::DesignRankDeficient {
            reason: format!("rank {} < {} columns", rank, k),
        });
    }
    Ok(())
}

/// A fitted weighted least-squares model for one gene.
#[derive(Debug, Clone)]
pub struct GeneFit {
    pub coefficients: DVector<f64>,
    pub fitted: DVector<f64>,
    /// residual variance (weighted RSS / df)
    pub sigma2: f64,
    /// unscaled coefficient covariance, `(X' W X)^-1`
    pub cov_unscaled: DMatrix<f64>,
}

/// Weighted least squares of one response vector on the design.
pub fn wls(design: &DMatrix<f64>, y: &DVector<f64>, weights: &DVector<f64>) -> Result<GeneFit> {
    let n = design.nrows();
    let k = design.ncols();
    debug_assert_eq!(y.len(), n);
    debug_assert_eq!(weights.len(), n);

    let df = n as f64 - k as f64;
    if df <= 0.0 {
        return Err(StatsError::DesignRankDeficient {
            reason: format!("no residual degrees of freedom ({} samples, {} coefficients)", n, k),
        });
    }

    let mut xtwx = DMatrix::zeros(k, k);
    let mut xtwy = DVector::zeros(k);
    for i in 0..n {
        let w = weights[i];
        let xi = design.row(i);
        for a in 0..k {
            xtwy[a] += w * xi[a] * y[i];
            for b in 0..k {
                xtwx[(a, b)] += w * xi[a] * xi[b];
            }
        }
    }

    let chol = Cholesky::new(xtwx).ok_or_else(|| StatsError::DesignRankDeficient {
        reason: "weighted normal equations are singular".into(),
    })?;
    let cov_unscaled = chol.inverse();
    let coefficients = &cov_unscaled * xtwy;

    let fitted: DVector<f64> = design * &coefficients;
    let mut rss = 0.0;
    for i in 0..n {
        let r = y[i] - fitted[i];
        rss += weights[i] * r * r;
    }

    Ok(GeneFit {
        coefficients,
        fitted,
        sigma2: rss / df,
        cov_unscaled,
    })
}

/// Fit every gene (row of `y`) against the shared design with
/// per-observation weights.
pub fn fit_genes(
    design: &DMatrix<f64>,
    y: &DMatrix<f64>,
    weights: &DMatrix<f64>,
) -> Result<Vec<GeneFit>> {
    if y.ncols() != design.nrows() || weights.shape() != y.shape() {
        return Err(StatsError::ShapeMismatch {
            reason: "expression, weights, and design dimensions disagree".into(),
        });
    }

    (0..y.nrows())
        .into_par_iter()
        .map(|g| {
            let yg = DVector::from_iterator(y.ncols(), y.row(g).iter().copied());
            let wg = DVector::from_iterator(weights.ncols(), weights.row(g).iter().copied());
            wls(design, &yg, &wg)
        })
        .collect()
}

/// Per-gene contrast estimates between two condition coefficients.
#[derive(Debug, Clone)]
pub struct ContrastFit {
    /// contrast estimate per gene (log2 fold change)
    pub estimate: Vec<f64>,
    /// unscaled standard error per gene, `sqrt(c' (X'WX)^-1 c)`
    pub se_unscaled: Vec<f64>,
    /// residual variance per gene
    pub sigma2: Vec<f64>,
    /// residual degrees of freedom, shared across genes
    pub df_residual: f64,
}

/// Apply the contrast vector `c` to every fitted gene.
pub fn apply_contrast(
    fits: &[GeneFit],
    contrast: &DVector<f64>,
    df_residual: f64,
) -> ContrastFit {
    let mut estimate = Vec::with_capacity(fits.len());
    let mut se_unscaled = Vec::with_capacity(fits.len());
    let mut sigma2 = Vec::with_capacity(fits.len());

    for fit in fits {
        estimate.push(contrast.dot(&fit.coefficients));
        let var_unscaled = (contrast.transpose() * &fit.cov_unscaled * contrast)[(0, 0)];
        se_unscaled.push(var_unscaled.max(0.0).sqrt());
        sigma2.push(fit.sigma2);
    }

    ContrastFit {
        estimate,
        se_unscaled,
        sigma2,
        df_residual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn labels(items: &[&str]) -> Vec<Box<str>> {
        items.iter().map(|s| s.to_string().into_boxed_str()).collect()
    }

    #[test]
    fn design_is_group_indicators() {
        let conditions = labels(&["a", "a", "b", "b"]);
        let levels = labels(&["a", "b"]);
        let design = design_matrix(&conditions, &levels).unwrap();
        assert_eq!(design.shape(), (4, 2));
        assert_abs_diff_eq!(design.column(0).sum(), 2.0);
        assert_abs_diff_eq!(design[(2, 1)], 1.0);
        assert_abs_diff_eq!(design[(2, 0)], 0.0);
    }

    #[test]
    fn empty_level_is_rank_deficient() {
        let conditions = labels(&["a", "a", "a"]);
        let levels = labels(&["a", "b"]);
        let err = design_matrix(&conditions, &levels).unwrap_err();
        assert!(matches!(err, StatsError::DesignRankDeficient { .. }));
    }

    #[test]
    fn unweighted_fit_recovers_group_means() {
        let conditions = labels(&["a", "a", "b", "b"]);
        let levels = labels(&["a", "b"]);
        let design = design_matrix(&conditions, &levels).unwrap();

        let y = DVector::from_row_slice(&[1.0, 3.0, 10.0, 14.0]);
        let w = DVector::from_element(4, 1.0);
        let fit = wls(&design, &y, &w).unwrap();

        assert_abs_diff_eq!(fit.coefficients[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.coefficients[1], 12.0, epsilon = 1e-12);
        // rss = (1+1) + (4+4) = 10, df = 2
        assert_abs_diff_eq!(fit.sigma2, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn weights_pull_the_estimate() {
        // intercept-only fit: the coefficient is the weighted mean
        let design = DMatrix::from_element(2, 1, 1.0);
        let y = DVector::from_row_slice(&[0.0, 10.0]);
        let w = DVector::from_row_slice(&[9.0, 1.0]);
        let fit = wls(&design, &y, &w).unwrap();
        assert_abs_diff_eq!(fit.coefficients[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn contrast_takes_coefficient_difference() {
        let conditions = labels(&["a", "a", "b", "b"]);
        let levels = labels(&["a", "b"]);
        let design = design_matrix(&conditions, &levels).unwrap();

        let y = DMatrix::from_row_slice(1, 4, &[1.0, 1.0, 5.0, 5.0]);
        let w = DMatrix::from_element(1, 4, 1.0);
        let fits = fit_genes(&design, &y, &w).unwrap();

        let contrast = DVector::from_row_slice(&[-1.0, 1.0]);
        let cf = apply_contrast(&fits, &contrast, 2.0);
        assert_abs_diff_eq!(cf.estimate[0], 4.0, epsilon = 1e-12);
        // var(c'b) unscaled = 1/2 + 1/2 = 1
        assert_abs_diff_eq!(cf.se_unscaled[0], 1.0, epsilon = 1e-12);
    }
}

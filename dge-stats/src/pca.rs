//! Principal components of the variance-stabilized matrix.

use crate::error::{Result, StatsError};

use nalgebra::DMatrix;

/// Number of most-variable genes entering the PCA by default.
pub const DEFAULT_TOP_GENES: usize = 1000;

/// Per-sample principal component scores plus the variance split over
/// the full eigenvalue spectrum.
pub struct PcaResult {
    /// samples x components, ordered by decreasing eigenvalue
    pub scores: DMatrix<f64>,
    /// percent of total variance per component, full spectrum
    pub percent_variance: Vec<f64>,
    /// row indices of the genes that entered the decomposition
    pub selected_genes: Vec<usize>,
}

/// Compute principal components on the `n_top` most variable genes of a
/// transformed genes x samples matrix. Samples are the observations:
/// the centered sample-by-gene matrix is decomposed by SVD.
pub fn principal_components(transformed: &DMatrix<f64>, n_top: usize) -> Result<PcaResult> {
    let n_genes = transformed.nrows();
    let n_samples = transformed.ncols();
    if n_genes == 0 || n_samples < 2 {
        return Err(StatsError::EmptyInput {
            reason: "PCA needs at least one gene and two samples".into(),
        });
    }

    let selected_genes = top_variable_rows(transformed, n_top.min(n_genes));

    // sample-by-gene matrix, each gene column centered
    let k = selected_genes.len();
    let mut mat = DMatrix::zeros(n_samples, k);
    for (col, &gene) in selected_genes.iter().enumerate() {
        let row = transformed.row(gene);
        let mean = row.sum() / n_samples as f64;
        for j in 0..n_samples {
            mat[(j, col)] = transformed[(gene, j)] - mean;
        }
    }

    let svd = mat.svd(true, false);
    let u = svd.u.ok_or_else(|| StatsError::Numerical {
        operation: "PCA".into(),
        details: "SVD did not return left singular vectors".into(),
    })?;
    let singular = &svd.singular_values;

    // scores = U * Sigma
    let n_comp = singular.len();
    let mut scores = DMatrix::zeros(n_samples, n_comp);
    for c in 0..n_comp {
        for j in 0..n_samples {
            scores[(j, c)] = u[(j, c)] * singular[c];
        }
    }

    let total: f64 = singular.iter().map(|s| s * s).sum();
    let percent_variance = if total > 0.0 {
        singular.iter().map(|s| s * s / total * 100.0).collect()
    } else {
        vec![0.0; n_comp]
    };

    Ok(PcaResult {
        scores,
        percent_variance,
        selected_genes,
    })
}

/// Indices of the `n_top` rows with the largest variance across columns,
/// returned in ascending index order.
pub fn top_variable_rows(mat: &DMatrix<f64>, n_top: usize) -> Vec<usize> {
    let n_cols = mat.ncols() as f64;
    let mut variances: Vec<(usize, f64)> = (0..mat.nrows())
        .map(|i| {
            let row = mat.row(i);
            let mean = row.sum() / n_cols;
            let var = row.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>()
                / (n_cols - 1.0).max(1.0);
            (i, var)
        })
        .collect();

    variances.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut selected: Vec<usize> = variances[..n_top.min(variances.len())]
        .iter()
        .map(|&(i, _)| i)
        .collect();
    selected.sort_unstable();
    selected
}

//! Expression filtering on TPM values.

use crate::error::{Result, StatsError};

use count_data::NamedMatrix;

/// Default TPM threshold a gene must reach to be considered expressed.
pub const DEFAULT_TPM_THRESHOLD: f64 = 1.0;
/// Default number of samples that must reach the threshold.
pub const DEFAULT_MIN_SAMPLES: usize = 1;

/// Gene counts before and after filtering.
#[derive(Debug, Clone, Copy)]
pub struct FilterSummary {
    pub total: usize,
    pub kept: usize,
}

/// Restrict matched count and TPM matrices to genes with
/// `TPM >= threshold` in at least `min_samples` samples. Row order is
/// preserved, so the operation is idempotent.
pub fn filter_expressed(
    counts: &NamedMatrix,
    tpm: &NamedMatrix,
    threshold: f64,
    min_samples: usize,
) -> Result<(NamedMatrix, NamedMatrix, FilterSummary)> {
    if counts.rows != tpm.rows || counts.cols != tpm.cols {
        return Err(StatsError::ShapeMismatch {
            reason: "count and TPM matrices must share gene and sample names".into(),
        });
    }

    let keep: Vec<usize> = (0..tpm.nrows())
        .filter(|&i| {
            let qualifying = tpm.values.row(i).iter().filter(|&&x| x >= threshold).count();
            qualifying >= min_samples
        })
        .collect();

    let summary = FilterSummary {
        total: tpm.nrows(),
        kept: keep.len(),
    };

    Ok((counts.select_rows(&keep), tpm.select_rows(&keep), summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dmatrix;

    fn names(items: &[&str]) -> Vec<Box<str>> {
        items.iter().map(|s| s.to_string().into_boxed_str()).collect()
    }

    fn pair() -> (NamedMatrix, NamedMatrix) {
        let genes = names(&["g1", "g2", "g3"]);
        let samples = names(&["a", "b"]);
        let counts = NamedMatrix::new(
            genes.clone(),
            samples.clone(),
            dmatrix![5.0, 8.0; 1.0, 0.0; 100.0, 90.0],
        )
        .unwrap();
        let tpm = NamedMatrix::new(
            genes,
            samples,
            dmatrix![0.2, 1.5; 0.3, 0.0; 40.0, 35.0],
        )
        .unwrap();
        (counts, tpm)
    }

    #[test]
    fn low_tpm_genes_are_removed() {
        let (counts, tpm) = pair();
        let (fc, ft, summary) = filter_expressed(&counts, &tpm, 1.0, 1).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.kept, 2);
        // g2 is below 1 TPM everywhere and must be gone
        assert!(fc.rows.iter().all(|g| g.as_ref() != "g2"));
        assert_eq!(fc.rows, ft.rows);
    }

    #[test]
    fn filtering_is_idempotent() {
        let (counts, tpm) = pair();
        let (fc1, ft1, _) = filter_expressed(&counts, &tpm, 1.0, 1).unwrap();
        let (fc2, ft2, summary) = filter_expressed(&fc1, &ft1, 1.0, 1).unwrap();
        assert_eq!(summary.total, summary.kept);
        assert_eq!(fc1.rows, fc2.rows);
        assert_eq!(ft1.rows, ft2.rows);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let (counts, tpm) = pair();
        let truncated = tpm.select_rows(&[0, 1]);
        let err = filter_expressed(&counts, &truncated, 1.0, 1).unwrap_err();
        assert!(matches!(err, StatsError::ShapeMismatch { .. }));
    }
}

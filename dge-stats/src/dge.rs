//! The differential expression engine.
//!
//! One entry point, [`run_dge`], takes TPM-filtered raw counts and the
//! per-sample condition labels and runs the full testing chain:
//! TMM normalization, precision weights, per-gene weighted linear
//! models, the condition contrast, empirical Bayes moderation, and
//! Benjamini-Hochberg correction. Callers only ever see the resulting
//! ranked table.

use crate::ebayes;
use crate::error::{Result, StatsError};
use crate::fdr::benjamini_hochberg;
use crate::lm;
use crate::tmm::tmm_factors;
use crate::voom::voom;

use count_data::NamedMatrix;
use log::info;
use nalgebra::DVector;

/// Adjusted p-value below which a gene is called significant.
pub const SIG_ADJ_P_CUTOFF: f64 = 0.05;
/// Absolute log2 fold change a significant gene must exceed. The source
/// analyses wavered between 1.5 and 1.0; 1.0 is used everywhere here.
pub const SIG_LFC_CUTOFF: f64 = 1.0;

/// The two condition levels being compared: `treatment - baseline`.
#[derive(Debug, Clone)]
pub struct Contrast {
    pub baseline: Box<str>,
    pub treatment: Box<str>,
}

/// One row of the ranked results table.
#[derive(Debug, Clone)]
pub struct DgeGene {
    pub gene_id: Box<str>,
    pub log_fc: f64,
    /// average log2-CPM across all samples
    pub ave_expr: f64,
    pub t: f64,
    pub p_value: f64,
    pub adj_p_value: f64,
}

impl DgeGene {
    pub fn is_significant(&self) -> bool {
        self.adj_p_value < SIG_ADJ_P_CUTOFF && self.log_fc.abs() > SIG_LFC_CUTOFF
    }
}

/// Ranked differential expression results, ascending by adjusted
/// p-value. Immutable once computed.
#[derive(Debug, Clone)]
pub struct DgeTable {
    pub genes: Vec<DgeGene>,
    pub tmm_factors: DVector<f64>,
    pub df_residual: f64,
    pub df_prior: f64,
}

impl DgeTable {
    pub fn n_significant(&self) -> usize {
        self.genes.iter().filter(|g| g.is_significant()).count()
    }

    pub fn n_up(&self) -> usize {
        self.genes
            .iter()
            .filter(|g| g.is_significant() && g.log_fc > 0.0)
            .count()
    }

    pub fn n_down(&self) -> usize {
        self.genes
            .iter()
            .filter(|g| g.is_significant() && g.log_fc < 0.0)
            .count()
    }
}

/// Run the differential test on filtered counts.
///
/// `conditions` holds one label per sample (column); the contrast names
/// the two levels to compare. Levels beyond the contrast still receive
/// their own design column and absorb their group mean.
pub fn run_dge(
    counts: &NamedMatrix,
    conditions: &[Box<str>],
    contrast: &Contrast,
) -> Result<DgeTable> {
    if conditions.len() != counts.ncols() {
        return Err(StatsError::ShapeMismatch {
            reason: format!(
                "{} condition labels for {} samples",
                conditions.len(),
                counts.ncols()
            ),
        });
    }

    let levels = condition_levels(conditions);
    let design = lm::design_matrix(conditions, &levels)?;
    let contrast_vec = contrast_vector(&levels, contrast)?;

    info!("TMM normalization over {} genes", counts.nrows());
    let factors = tmm_factors(&counts.values)?;

    info!("estimating mean-variance precision weights");
    let v = voom(&counts.values, &factors, &design)?;

    info!("fitting weighted linear models");
    let fits = lm::fit_genes(&design, &v.log_cpm, &v.weights)?;
    let df_residual = counts.ncols() as f64 - levels.len() as f64;
    let contrast_fit = lm::apply_contrast(&fits, &contrast_vec, df_residual);

    info!("moderating variances");
    let stats = ebayes::moderate(&contrast_fit)?;
    let adj = benjamini_hochberg(&stats.p_value);

    let n_samples = counts.ncols() as f64;
    let mut genes: Vec<DgeGene> = (0..counts.nrows())
        .map(|g| DgeGene {
            gene_id: counts.rows[g].clone(),
            log_fc: contrast_fit.estimate[g],
            ave_expr: v.log_cpm.row(g).sum() / n_samples,
            t: stats.t[g],
            p_value: stats.p_value[g],
            adj_p_value: adj[g],
        })
        .collect();

    genes.sort_by(|a, b| {
        a.adj_p_value
            .partial_cmp(&b.adj_p_value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.p_value
                    .partial_cmp(&b.p_value)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    Ok(DgeTable {
        genes,
        tmm_factors: factors,
        df_residual,
        df_prior: stats.prior.df_prior,
    })
}

fn condition_levels(conditions: &[Box<str>]) -> Vec<Box<str>> {
    let mut levels: Vec<Box<str>> = vec![];
    for c in conditions {
        if !levels.iter().any(|l| l == c) {
            levels.push(c.clone());
        }
    }
    levels
}

fn contrast_vector(levels: &[Box<str>], contrast: &Contrast) -> Result<DVector<f64>> {
    let position = |name: &str| {
        levels
            .iter()
            .position(|l| l.as_ref() == name)
            .ok_or_else(|| StatsError::DesignRankDeficient {
                reason: format!("contrast level '{}' has no samples", name),
            })
    };
    let baseline = position(&contrast.baseline)?;
    let treatment = position(&contrast.treatment)?;
    if baseline == treatment {
        return Err(StatsError::DesignRankDeficient {
            reason: "contrast compares a level against itself".into(),
        });
    }

    let mut c = DVector::zeros(levels.len());
    c[treatment] = 1.0;
    c[baseline] = -1.0;
    Ok(c)
}

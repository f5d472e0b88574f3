//! Statistical routines for RNA-seq differential expression reports.
//!
//! The modules follow the pipeline order: variance-stabilizing transform
//! for exploration ([`vst`]), principal components ([`pca`]) and Ward
//! clustering ([`hclust`]) over the transformed matrix, TPM-based
//! expression filtering ([`filter`]), then the differential testing
//! chain: TMM normalization ([`tmm`]), mean-variance precision weights
//! ([`voom`]), weighted linear models with a condition contrast ([`lm`]),
//! empirical Bayes variance moderation ([`ebayes`]), and FDR control
//! ([`fdr`]). [`dge`] ties the testing chain together behind one call so
//! rendering code never touches the statistical internals.

pub mod dge;
pub mod ebayes;
pub mod error;
pub mod fdr;
pub mod filter;
pub mod hclust;
pub mod lm;
pub mod pca;
pub mod tmm;
pub mod voom;
pub mod vst;

pub use dge::{run_dge, Contrast, DgeGene, DgeTable, SIG_ADJ_P_CUTOFF, SIG_LFC_CUTOFF};
pub use error::StatsError;

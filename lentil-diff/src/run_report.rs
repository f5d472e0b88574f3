use crate::common::*;
use crate::input::*;
use crate::plot;

use count_data::common_io::{mkdir, open_buf_writer};
use dge_stats::filter::{filter_expressed, DEFAULT_MIN_SAMPLES, DEFAULT_TPM_THRESHOLD};
use dge_stats::hclust::{sample_distance_matrix, ward_cluster};
use dge_stats::pca::{principal_components, DEFAULT_TOP_GENES};
use dge_stats::vst::variance_stabilize;
use dge_stats::{run_dge, Contrast, DgeTable};

use clap::Parser;
use std::io::Write;

#[derive(Parser, Debug, Clone)]
pub struct ReportArgs {
    /// sample plan file with `sample`, `condition`, and `replicate`
    /// columns (`.csv` or `.tsv`, optionally gzipped)
    #[arg(long, short = 'p', required = true)]
    plan: Box<str>,

    /// gene-by-sample raw count matrix
    #[arg(long, short = 'c', required = true)]
    counts: Box<str>,

    /// gene-by-sample TPM matrix matching the count matrix
    #[arg(long, short = 't', required = true)]
    tpm: Box<str>,

    /// baseline condition of the contrast; defaults to the first level
    /// in the plan
    #[arg(long)]
    baseline: Option<Box<str>>,

    /// treatment condition of the contrast; defaults to the second level
    #[arg(long)]
    treatment: Option<Box<str>>,

    /// TPM threshold a gene must reach to be kept
    #[arg(long, default_value_t = DEFAULT_TPM_THRESHOLD)]
    tpm_cutoff: f64,

    /// number of most-variable genes entering the PCA
    #[arg(long, default_value_t = DEFAULT_TOP_GENES)]
    top_genes: usize,

    /// output directory
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

/// Run the full report: exploratory analysis on all genes, expression
/// filtering, the differential test, and every figure and table.
pub fn run_report(args: ReportArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let data = read_input_data(InputDataArgs {
        plan_file: args.plan.clone(),
        count_file: args.counts.clone(),
        tpm_file: args.tpm.clone(),
    })?;

    let out = args.out.to_string();
    mkdir(&format!("{}/results.csv", out))?;

    let display = data.plan.display_names();
    let conditions = data.plan.conditions();

    plot::plot_totals(
        &display,
        &data.counts.col_sums(),
        "Total raw counts per sample",
        &format!("{}/total_counts.svg", out),
    )?;
    plot::plot_totals(
        &display,
        &data.tpm.col_sums(),
        "Total TPM per sample",
        &format!("{}/total_tpm.svg", out),
    )?;

    info!("variance-stabilizing transform over all genes");
    let vst = variance_stabilize(&data.counts.values)?;

    let pca = principal_components(&vst.transformed, args.top_genes)?;
    plot::plot_pca(
        &pca.scores,
        &pca.percent_variance,
        &display,
        &conditions,
        &format!("{}/pca.svg", out),
    )?;
    write_pca_scores(&pca.scores, &display, &format!("{}/pca_scores.tsv", out))?;

    // clustering uses every gene, not the PCA subset
    let dist = sample_distance_matrix(&vst.transformed);
    let dendro = ward_cluster(&dist)?;
    plot::plot_distance_heatmap(
        &dist,
        &dendro,
        &display,
        &format!("{}/distance_heatmap.svg", out),
    )?;

    let (filtered_counts, _filtered_tpm, summary) = filter_expressed(
        &data.counts,
        &data.tpm,
        args.tpm_cutoff,
        DEFAULT_MIN_SAMPLES,
    )?;
    info!(
        "expression filter: kept {} of {} genes at TPM >= {}",
        summary.kept, summary.total, args.tpm_cutoff
    );

    let contrast = resolve_contrast(&data.plan, &args)?;
    info!(
        "testing {} vs {} (baseline)",
        contrast.treatment, contrast.baseline
    );

    let table = run_dge(&filtered_counts, &conditions, &contrast)?;
    info!(
        "{} significant genes ({} up, {} down) of {}",
        table.n_significant(),
        table.n_up(),
        table.n_down(),
        table.genes.len()
    );

    write_tmm_factors(&table, &display, &format!("{}/tmm_factors.tsv", out))?;
    plot::plot_pvalue_histogram(
        &table.genes.iter().map(|g| g.p_value).collect::<Vec<_>>(),
        &format!("{}/pvalue_histogram.svg", out),
    )?;
    plot::plot_volcano(&table, &format!("{}/volcano.svg", out))?;

    write_results_csv(&table, &format!("{}/results.csv", out))?;
    info!("done; report written under {}", out);
    Ok(())
}

fn resolve_contrast(plan: &SamplePlan, args: &ReportArgs) -> anyhow::Result<Contrast> {
    let levels = plan.condition_levels();
    let baseline = match &args.baseline {
        Some(level) => level.clone(),
        None => levels
            .first()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("the plan has no condition levels"))?,
    };
    let treatment = match &args.treatment {
        Some(level) => level.clone(),
        None => levels
            .iter()
            .find(|l| **l != baseline)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("the plan needs two condition levels"))?,
    };
    Ok(Contrast {
        baseline,
        treatment,
    })
}

/// Ranked results as unquoted CSV, one gene per line, no row index.
pub fn write_results_csv(table: &DgeTable, file_path: &str) -> anyhow::Result<()> {
    let mut buf = open_buf_writer(file_path)?;
    writeln!(buf, "gene_id,logFC,AveExpr,t,P.Value,adj.P.Val")?;
    for gene in &table.genes {
        writeln!(
            buf,
            "{},{},{},{},{},{}",
            gene.gene_id, gene.log_fc, gene.ave_expr, gene.t, gene.p_value, gene.adj_p_value
        )?;
    }
    buf.flush()?;
    Ok(())
}

fn write_pca_scores(scores: &Mat, names: &[Box<str>], file_path: &str) -> anyhow::Result<()> {
    let cols: Vec<Box<str>> = (0..scores.ncols())
        .map(|c| format!("PC{}", c + 1).into_boxed_str())
        .collect();
    let named = NamedMatrix::new(names.to_vec(), cols, scores.clone())?;
    named.write_delim(file_path, "sample")?;
    Ok(())
}

fn write_tmm_factors(
    table: &DgeTable,
    names: &[Box<str>],
    file_path: &str,
) -> anyhow::Result<()> {
    let mut buf = open_buf_writer(file_path)?;
    writeln!(buf, "sample\tfactor")?;
    for (name, factor) in names.iter().zip(table.tmm_factors.iter()) {
        writeln!(buf, "{}\t{}", name, factor)?;
    }
    buf.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dge_stats::dge::DgeGene;
    use nalgebra::DVector;

    #[test]
    fn report_runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = |name: &str, content: String| {
            let path = dir.path().join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            write!(file, "{}", content).unwrap();
            path.to_str().unwrap().to_string().into_boxed_str()
        };

        let plan = input(
            "plan.csv",
            "sample,condition,replicate\n\
             S1,untreated,1\nS2,untreated,2\nS3,EGF,1\nS4,EGF,2\n"
                .to_string(),
        );

        // 30 genes; the first three are strongly up in EGF
        let mut counts = String::from("gene\tS1\tS2\tS3\tS4\n");
        let mut tpm = String::from("gene\tS1\tS2\tS3\tS4\n");
        for g in 0..30 {
            let base = 100 + (g * 13) % 50;
            let mut row = vec![format!("g{}", g)];
            let mut trow = vec![format!("g{}", g)];
            for j in 0..4 {
                let jitter = (g * 7 + j * 11) % 17;
                let mut c = base + jitter;
                if g < 3 && j >= 2 {
                    c *= 8;
                }
                row.push(c.to_string());
                trow.push(format!("{}", c as f64 / 10.0));
            }
            counts.push_str(&(row.join("\t") + "\n"));
            tpm.push_str(&(trow.join("\t") + "\n"));
        }
        let counts = input("counts.tsv", counts);
        let tpm = input("tpm.tsv", tpm);

        let out = dir.path().join("report").to_str().unwrap().to_string();
        run_report(ReportArgs {
            plan,
            counts,
            tpm,
            baseline: None,
            treatment: None,
            tpm_cutoff: 1.0,
            top_genes: 30,
            out: out.clone().into_boxed_str(),
            verbose: false,
        })
        .unwrap();

        for file in [
            "total_counts.svg",
            "total_tpm.svg",
            "pca.svg",
            "pca_scores.tsv",
            "distance_heatmap.svg",
            "tmm_factors.tsv",
            "pvalue_histogram.svg",
            "volcano.svg",
            "results.csv",
        ] {
            assert!(
                std::path::Path::new(&out).join(file).exists(),
                "{} missing",
                file
            );
        }

        let results = std::fs::read_to_string(format!("{}/results.csv", out)).unwrap();
        let mut lines = results.lines();
        assert_eq!(
            lines.next().unwrap(),
            "gene_id,logFC,AveExpr,t,P.Value,adj.P.Val"
        );
        // the planted 8-fold genes outrank everything else
        let top: Vec<&str> = lines
            .take(3)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        for g in ["g0", "g1", "g2"] {
            assert!(top.contains(&g), "{} not in top 3 of {:?}", g, top);
        }
    }

    #[test]
    fn results_csv_is_unquoted_and_ordered() {
        let table = DgeTable {
            genes: vec![
                DgeGene {
                    gene_id: "gA".into(),
                    log_fc: 2.5,
                    ave_expr: 6.0,
                    t: 10.0,
                    p_value: 1e-5,
                    adj_p_value: 1e-4,
                },
                DgeGene {
                    gene_id: "gB".into(),
                    log_fc: -0.1,
                    ave_expr: 3.0,
                    t: -0.5,
                    p_value: 0.6,
                    adj_p_value: 0.8,
                },
            ],
            tmm_factors: DVector::from_element(2, 1.0),
            df_residual: 2.0,
            df_prior: f64::INFINITY,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let path = path.to_str().unwrap();
        write_results_csv(&table, path).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "gene_id,logFC,AveExpr,t,P.Value,adj.P.Val");
        assert!(lines[1].starts_with("gA,2.5,6,10,"));
        assert!(!text.contains('"'));
    }
}

use crate::common::*;

use count_data::common_io::{mkdir, open_buf_writer, write_lines};

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma, Poisson, Uniform};
use std::io::Write;

#[derive(Parser, Debug, Clone)]
pub struct SimArgs {
    /// number of genes
    #[arg(short = 'g', long, default_value_t = 5000)]
    n_genes: usize,

    /// number of replicates per condition
    #[arg(short = 'r', long, default_value_t = 2)]
    n_replicates: usize,

    /// number of genes with a planted fold change
    #[arg(short = 'a', long, default_value_t = 100)]
    n_causal_genes: usize,

    /// planted fold change on the count scale
    #[arg(long, default_value_t = 4.0)]
    fold_change: f64,

    /// average sequencing depth per sample
    #[arg(short, long, default_value_t = 5_000_000)]
    depth: usize,

    /// overdispersion; gamma shape is `1 / overdisp`
    #[arg(long, default_value_t = 0.05)]
    overdisp: f64,

    /// random seed
    #[arg(long, default_value_t = 42)]
    rseed: u64,

    /// output header; writes `<out>.plan.csv`, `<out>.counts.tsv.gz`,
    /// `<out>.tpm.tsv.gz`, and `<out>.causal.tsv`
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_sim_count_data(args: SimArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    info!("simulating gamma-Poisson counts...");
    let sim_out = generate_count_data(&args)?;

    let output = args.out.to_string();
    mkdir(&output)?;

    let plan_file = output.clone() + ".plan.csv";
    let count_file = output.clone() + ".counts.tsv.gz";
    let tpm_file = output.clone() + ".tpm.tsv.gz";
    let causal_file = output.clone() + ".causal.tsv";

    let mut plan_lines = vec!["sample,condition,replicate".to_string()];
    for (sample, (condition, replicate)) in sim_out
        .sample_ids
        .iter()
        .zip(sim_out.sample_conditions.iter())
    {
        plan_lines.push(format!("{},{},{}", sample, condition, replicate));
    }
    write_lines(&plan_lines, &plan_file)?;

    sim_out.counts.write_delim(&count_file, "gene")?;
    sim_out.tpm.write_delim(&tpm_file, "gene")?;

    let mut buf = open_buf_writer(&causal_file)?;
    writeln!(buf, "gene\tlog2_fold_change")?;
    for (gene, lfc) in &sim_out.causal_genes {
        writeln!(buf, "{}\t{}", gene, lfc)?;
    }
    buf.flush()?;

    info!(
        "wrote {} genes x {} samples:\n{}\n{}\n{}\n{}",
        sim_out.counts.nrows(),
        sim_out.counts.ncols(),
        plan_file,
        count_file,
        tpm_file,
        causal_file
    );
    Ok(())
}

pub struct SimOut {
    pub sample_ids: Vec<Box<str>>,
    pub sample_conditions: Vec<(Box<str>, u32)>,
    pub counts: NamedMatrix,
    pub tpm: NamedMatrix,
    pub causal_genes: Vec<(Box<str>, f64)>,
}

/// Generate
///
/// ```text
/// Y(g,j) ~ Poisson{ lambda(g) * delta(g, condition(j)) * depth_j }
/// lambda(g) ~ Gamma(1/overdisp, .)   per sample draw
/// delta(g, treated) = fold_change for causal genes, 1 otherwise
/// ```
///
/// TPM values are derived from the counts with random gene lengths, so
/// the two matrices agree the way quantifier output would.
pub fn generate_count_data(args: &SimArgs) -> anyhow::Result<SimOut> {
    let n_genes = args.n_genes;
    let n_samples = args.n_replicates * 2;
    if args.n_causal_genes > n_genes {
        anyhow::bail!("more causal genes than genes");
    }

    let mut rng = StdRng::seed_from_u64(args.rseed);

    // base expression on a roughly log-uniform scale
    let log_mean = Uniform::new(0.0_f64, 8.0)?;
    let base: Vec<f64> = (0..n_genes)
        .map(|_| 2_f64.powf(log_mean.sample(&mut rng)))
        .collect();
    let total_base: f64 = base.iter().sum();

    let length = Uniform::new(500.0_f64, 5000.0)?;
    let gene_lengths: Vec<f64> = (0..n_genes).map(|_| length.sample(&mut rng)).collect();

    // first `n_causal_genes` genes carry the fold change; they were
    // drawn from the same base distribution so the choice is arbitrary
    let lfc = args.fold_change.log2();
    let causal_genes: Vec<(Box<str>, f64)> = (0..args.n_causal_genes)
        .map(|g| (gene_name(g), lfc))
        .collect();

    let conditions = ["control", "treated"];
    let mut sample_ids = vec![];
    let mut sample_conditions = vec![];
    for (c, condition) in conditions.iter().enumerate() {
        for r in 1..=args.n_replicates {
            sample_ids.push(format!("S{}", c * args.n_replicates + r).into_boxed_str());
            sample_conditions.push((condition.to_string().into_boxed_str(), r as u32));
        }
    }

    let shape = 1.0 / args.overdisp;
    let depth_scale = args.depth as f64 / total_base;

    let mut counts = Mat::zeros(n_genes, n_samples);
    for j in 0..n_samples {
        let treated = j >= args.n_replicates;
        for g in 0..n_genes {
            let mut mean = base[g] * depth_scale;
            if treated && g < args.n_causal_genes {
                mean *= args.fold_change;
            }
            let lambda = Gamma::new(shape, mean / shape)?.sample(&mut rng);
            counts[(g, j)] = Poisson::new(lambda.max(1e-8))?.sample(&mut rng);
        }
    }

    // TPM: counts per gene length, normalized to a million per sample
    let mut tpm = Mat::zeros(n_genes, n_samples);
    for j in 0..n_samples {
        let rates: Vec<f64> = (0..n_genes)
            .map(|g| counts[(g, j)] / gene_lengths[g])
            .collect();
        let total: f64 = rates.iter().sum();
        if total > 0.0 {
            for g in 0..n_genes {
                tpm[(g, j)] = rates[g] / total * 1e6;
            }
        }
    }

    let gene_names: Vec<Box<str>> = (0..n_genes).map(gene_name).collect();
    let counts = NamedMatrix::new(gene_names.clone(), sample_ids.clone(), counts)?;
    let tpm = NamedMatrix::new(gene_names, sample_ids.clone(), tpm)?;

    Ok(SimOut {
        sample_ids,
        sample_conditions,
        counts,
        tpm,
        causal_genes,
    })
}

fn gene_name(g: usize) -> Box<str> {
    format!("gene_{:05}", g).into_boxed_str()
}

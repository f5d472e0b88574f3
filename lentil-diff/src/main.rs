mod common;
mod input;
mod plot;
mod run_report;
mod run_sim;

use crate::run_report::*;
use crate::run_sim::*;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Differential expression report from count and TPM matrices
    Report(ReportArgs),

    /// Simulate count and TPM matrices with planted fold changes
    Simulate(SimArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Report(args) => {
            run_report(args.clone())?;
        }
        Commands::Simulate(args) => {
            run_sim_count_data(args.clone())?;
        }
    }

    Ok(())
}

use crate::common::*;

pub struct InputDataArgs {
    pub plan_file: Box<str>,
    pub count_file: Box<str>,
    pub tpm_file: Box<str>,
}

/// Plan plus count and TPM matrices, columns reordered to plan order and
/// relabelled with `condition_replicate` display names.
#[derive(Debug)]
pub struct InputData {
    pub plan: SamplePlan,
    pub counts: NamedMatrix,
    pub tpm: NamedMatrix,
}

pub fn read_input_data(args: InputDataArgs) -> anyhow::Result<InputData> {
    let plan = SamplePlan::read_delim(&args.plan_file)?;
    info!(
        "sample plan: {} samples over conditions [{}]",
        plan.len(),
        plan.condition_levels().join(", ")
    );

    let ids = plan.sample_ids();
    let display = plan.display_names();

    let counts = NamedMatrix::read_delim(&args.count_file)?;
    counts.check_non_negative("count")?;
    info!(
        "count matrix: {} genes x {} samples",
        counts.nrows(),
        counts.ncols()
    );
    let counts = counts.match_columns(&ids, &display)?;

    let (counts, dropped) = counts.drop_zero_rows();
    if !dropped.is_empty() {
        info!("dropped {} genes with zero counts everywhere", dropped.len());
    }

    let tpm = NamedMatrix::read_delim(&args.tpm_file)?;
    tpm.check_non_negative("TPM")?;
    let tpm = tpm.match_columns(&ids, &display)?;
    // keep the TPM rows aligned with the surviving count rows
    let tpm = tpm.select_rows_by_name(&counts.rows)?;

    Ok(InputData { plan, counts, tpm })
}

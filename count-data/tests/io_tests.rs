use count_data::{NamedMatrix, SamplePlan};

use approx::assert_abs_diff_eq;
use std::io::Write;

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, "{}", content).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn counts_load_match_and_round_trip() {
    let dir = tempfile::tempdir().unwrap();

    let plan_path = write_file(
        &dir,
        "plan.csv",
        "sample,condition,replicate\n\
         SRR2,EGF,1\n\
         SRR1,untreated,1\n",
    );

    // columns deliberately out of plan order
    let counts_path = write_file(
        &dir,
        "counts.csv",
        "gene_id,SRR1,SRR2\n\
         ENSG01,10,40\n\
         ENSG02,0,0\n\
         ENSG03,5,7\n",
    );

    let plan = SamplePlan::read_delim(&plan_path).unwrap();
    let raw = NamedMatrix::read_delim(&counts_path).unwrap();
    assert_eq!(raw.nrows(), 3);

    let matched = raw
        .match_columns(&plan.sample_ids(), &plan.display_names())
        .unwrap();
    assert_eq!(matched.cols[0].as_ref(), "EGF_1");
    // SRR2 column moved first
    assert_abs_diff_eq!(matched.values[(0, 0)], 40.0);
    assert_abs_diff_eq!(matched.values[(0, 1)], 10.0);

    let (kept, dropped) = matched.drop_zero_rows();
    assert_eq!(kept.nrows(), 2);
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].as_ref(), "ENSG02");

    let out_path = dir.path().join("out.csv").to_str().unwrap().to_string();
    kept.write_delim(&out_path, "gene_id").unwrap();
    let reread = NamedMatrix::read_delim(&out_path).unwrap();
    assert_eq!(reread.rows, kept.rows);
    assert_eq!(reread.cols, kept.cols);
    assert_abs_diff_eq!(reread.values[(1, 1)], kept.values[(1, 1)]);
}

#[test]
fn duplicate_gene_rows_are_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();

    // a repeated gene id would make count/TPM row pairing ambiguous:
    // name lookups can only resolve one of the two rows
    let counts_path = write_file(
        &dir,
        "counts.csv",
        "gene_id,s1,s2\n\
         g1,10,12\n\
         g2,7,8\n\
         g1,999,999\n",
    );

    let err = NamedMatrix::read_delim(&counts_path).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("g1"), "unexpected error: {}", message);
    assert!(message.contains("line 4"), "unexpected error: {}", message);
}

#[test]
fn gzipped_matrix_reads_like_plain() {
    let dir = tempfile::tempdir().unwrap();
    let plain = write_file(
        &dir,
        "tpm.csv",
        "gene_id,s1,s2\n\
         g1,0.5,2.25\n\
         g2,12,0\n",
    );

    let mat = NamedMatrix::read_delim(&plain).unwrap();
    let gz_path = dir.path().join("tpm.csv.gz").to_str().unwrap().to_string();
    mat.write_delim(&gz_path, "gene_id").unwrap();

    let gz = NamedMatrix::read_delim(&gz_path).unwrap();
    assert_eq!(gz.rows, mat.rows);
    assert_abs_diff_eq!(gz.values[(0, 1)], 2.25);
}

//! The sample plan: which sample belongs to which condition.

use crate::common_io::DelimTable;
use crate::error::{DataError, Result};

use fnv::FnvHashMap;

/// One row of the sample plan.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub sample_id: Box<str>,
    pub display_name: Box<str>,
    pub condition: Box<str>,
    pub replicate: u32,
}

/// Ordered collection of sample records. Sample ids are unique; the
/// record order defines the column order of every downstream matrix.
#[derive(Debug, Clone)]
pub struct SamplePlan {
    pub samples: Vec<SampleRecord>,
}

const SAMPLE_COL: &str = "sample";
const CONDITION_COL: &str = "condition";
const REPLICATE_COL: &str = "replicate";

impl SamplePlan {
    /// Load a plan from a delimited file with `sample`, `condition` and
    /// `replicate` columns. Display names are `condition_replicate`.
    pub fn read_delim(file_path: &str) -> Result<Self> {
        let table = DelimTable::read(file_path)?;

        let sample_idx = require_column(&table, SAMPLE_COL, file_path)?;
        let condition_idx = require_column(&table, CONDITION_COL, file_path)?;
        let replicate_idx = require_column(&table, REPLICATE_COL, file_path)?;

        let mut samples = Vec::with_capacity(table.rows.len());
        for (i, fields) in table.rows.iter().enumerate() {
            let sample_id = fields[sample_idx].clone();
            let condition = fields[condition_idx].clone();
            let replicate: u32 =
                fields[replicate_idx]
                    .parse()
                    .map_err(|_| DataError::MalformedInput {
                        reason: format!(
                            "{} line {}: replicate '{}' is not an integer",
                            file_path,
                            i + 2,
                            fields[replicate_idx]
                        ),
                    })?;
            let display_name = format!("{}_{}", condition, replicate).into_boxed_str();
            samples.push(SampleRecord {
                sample_id,
                display_name,
                condition,
                replicate,
            });
        }

        let plan = SamplePlan { samples };
        plan.validate(file_path)?;
        Ok(plan)
    }

    fn validate(&self, file_path: &str) -> Result<()> {
        if self.samples.is_empty() {
            return Err(DataError::MalformedInput {
                reason: format!("{} lists no samples", file_path),
            });
        }
        let mut seen: FnvHashMap<&str, ()> = FnvHashMap::default();
        for record in &self.samples {
            if seen.insert(record.sample_id.as_ref(), ()).is_some() {
                return Err(DataError::MalformedInput {
                    reason: format!("duplicate sample id '{}'", record.sample_id),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_ids(&self) -> Vec<Box<str>> {
        self.samples.iter().map(|s| s.sample_id.clone()).collect()
    }

    pub fn display_names(&self) -> Vec<Box<str>> {
        self.samples.iter().map(|s| s.display_name.clone()).collect()
    }

    /// Condition label per sample, in plan order.
    pub fn conditions(&self) -> Vec<Box<str>> {
        self.samples.iter().map(|s| s.condition.clone()).collect()
    }

    /// Distinct condition levels, ordered by first appearance.
    pub fn condition_levels(&self) -> Vec<Box<str>> {
        let mut levels: Vec<Box<str>> = vec![];
        for record in &self.samples {
            if !levels.iter().any(|l| *l == record.condition) {
                levels.push(record.condition.clone());
            }
        }
        levels
    }
}

fn require_column(table: &DelimTable, name: &str, file_path: &str) -> Result<usize> {
    table
        .column_index(name)
        .ok_or_else(|| DataError::MalformedInput {
            reason: format!("{} is missing the '{}' column", file_path, name),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_plan(content: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        let path = path.to_str().unwrap().to_string();
        (dir, path)
    }

    #[test]
    fn plan_parses_and_builds_display_names() {
        let (_dir, path) = write_plan(
            "sample,condition,replicate\n\
             SRR1,untreated,1\n\
             SRR2,untreated,2\n\
             SRR3,EGF,1\n\
             SRR4,EGF,2\n",
        );
        let plan = SamplePlan::read_delim(&path).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.samples[2].display_name.as_ref(), "EGF_1");
        assert_eq!(
            plan.condition_levels(),
            vec!["untreated".into(), "EGF".into()] as Vec<Box<str>>
        );
    }

    #[test]
    fn missing_column_is_malformed() {
        let (_dir, path) = write_plan("sample,condition\nSRR1,untreated\n");
        let err = SamplePlan::read_delim(&path).unwrap_err();
        assert!(matches!(err, DataError::MalformedInput { .. }));
    }

    #[test]
    fn duplicate_sample_id_is_malformed() {
        let (_dir, path) = write_plan(
            "sample,condition,replicate\n\
             SRR1,untreated,1\n\
             SRR1,EGF,1\n",
        );
        let err = SamplePlan::read_delim(&path).unwrap_err();
        assert!(matches!(err, DataError::MalformedInput { .. }));
    }

    #[test]
    fn non_integer_replicate_is_malformed() {
        let (_dir, path) = write_plan("sample,condition,replicate\nSRR1,untreated,one\n");
        let err = SamplePlan::read_delim(&path).unwrap_err();
        assert!(matches!(err, DataError::MalformedInput { .. }));
    }
}

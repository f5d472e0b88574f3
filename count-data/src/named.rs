//! Dense matrices with gene row names and sample column names.

use crate::common_io::{delimiter_for, open_buf_writer, parse_field, DelimTable};
use crate::error::{DataError, Result};

use fnv::FnvHashMap;
use nalgebra::{DMatrix, DVector};
use std::io::Write;

/// A gene-by-sample matrix with names on both axes.
///
/// Rows are genes, columns are samples. Values are `f64` throughout;
/// raw counts are stored as whole numbers in a float matrix.
#[derive(Debug, Clone)]
pub struct NamedMatrix {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub values: DMatrix<f64>,
}

impl NamedMatrix {
    pub fn new(rows: Vec<Box<str>>, cols: Vec<Box<str>>, values: DMatrix<f64>) -> Result<Self> {
        if rows.len() != values.nrows() || cols.len() != values.ncols() {
            return Err(DataError::MalformedInput {
                reason: format!(
                    "names ({} x {}) do not match matrix ({} x {})",
                    rows.len(),
                    cols.len(),
                    values.nrows(),
                    values.ncols()
                ),
            });
        }
        Ok(NamedMatrix { rows, cols, values })
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// Read a delimited gene-by-sample table. The header line carries a
    /// row-name label followed by sample names; every body line starts
    /// with the gene identifier.
    pub fn read_delim(file_path: &str) -> Result<Self> {
        let table = DelimTable::read(file_path)?;

        if table.header.len() < 2 {
            return Err(DataError::MalformedInput {
                reason: format!("{} has no sample columns", file_path),
            });
        }

        let cols: Vec<Box<str>> = table.header[1..].to_vec();
        let ncols = cols.len();
        let nrows = table.rows.len();

        let mut rows = Vec::with_capacity(nrows);
        let mut data = Vec::with_capacity(nrows * ncols);
        let mut seen: FnvHashMap<Box<str>, ()> = FnvHashMap::default();

        for (i, fields) in table.rows.iter().enumerate() {
            if seen.insert(fields[0].clone(), ()).is_some() {
                return Err(DataError::MalformedInput {
                    reason: format!(
                        "{} line {}: duplicate row name '{}'",
                        file_path,
                        i + 2,
                        fields[0]
                    ),
                });
            }
            rows.push(fields[0].clone());
            for field in &fields[1..] {
                data.push(parse_field(field, i + 2)?);
            }
        }

        let values = DMatrix::from_row_iterator(nrows, ncols, data);
        Self::new(rows, cols, values)
    }

    /// Write the matrix back out as a delimited table, `row_label` naming
    /// the gene-identifier column. Fields are unquoted.
    pub fn write_delim(&self, file_path: &str, row_label: &str) -> Result<()> {
        let delim = delimiter_for(file_path).to_string();
        let mut buf = open_buf_writer(file_path)?;

        let mut header = vec![row_label.to_string()];
        header.extend(self.cols.iter().map(|c| c.to_string()));
        writeln!(buf, "{}", header.join(&delim))?;

        for (i, name) in self.rows.iter().enumerate() {
            let mut fields = vec![name.to_string()];
            fields.extend(self.values.row(i).iter().map(|x| format!("{}", x)));
            writeln!(buf, "{}", fields.join(&delim))?;
        }
        buf.flush()?;
        Ok(())
    }

    /// Verify every value is non-negative, naming the first offending
    /// gene/sample pair. Counts and TPM values have no business being
    /// below zero; fractional counts are tolerated.
    pub fn check_non_negative(&self, what: &str) -> Result<()> {
        for i in 0..self.nrows() {
            for j in 0..self.ncols() {
                let v = self.values[(i, j)];
                if !(v >= 0.0) {
                    return Err(DataError::MalformedInput {
                        reason: format!(
                            "{} value {} for gene '{}' in sample '{}' is negative",
                            what, v, self.rows[i], self.cols[j]
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    fn col_map(&self) -> FnvHashMap<&str, usize> {
        self.cols
            .iter()
            .enumerate()
            .map(|(j, name)| (name.as_ref(), j))
            .collect()
    }

    pub fn row_map(&self) -> FnvHashMap<&str, usize> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_ref(), i))
            .collect()
    }

    /// Reorder columns to follow `ids` and relabel them with `display`
    /// names. Every id must resolve to an existing column.
    pub fn match_columns(&self, ids: &[Box<str>], display: &[Box<str>]) -> Result<Self> {
        debug_assert_eq!(ids.len(), display.len());
        let col_map = self.col_map();

        let mut indices = Vec::with_capacity(ids.len());
        for id in ids {
            let j = col_map
                .get(id.as_ref())
                .ok_or_else(|| DataError::SampleMismatch {
                    sample: id.to_string(),
                })?;
            indices.push(*j);
        }

        let values = self.values.select_columns(indices.iter());
        Self::new(self.rows.clone(), display.to_vec(), values)
    }

    /// Keep the rows at `indices`, preserving the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let rows = indices.iter().map(|&i| self.rows[i].clone()).collect();
        let values = self.values.select_rows(indices.iter());
        NamedMatrix {
            rows,
            cols: self.cols.clone(),
            values,
        }
    }

    /// Subset rows by gene name, preserving the given order.
    pub fn select_rows_by_name(&self, names: &[Box<str>]) -> Result<Self> {
        let row_map = self.row_map();
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let i = row_map
                .get(name.as_ref())
                .ok_or_else(|| DataError::MalformedInput {
                    reason: format!("gene '{}' not found", name),
                })?;
            indices.push(*i);
        }
        Ok(self.select_rows(&indices))
    }

    /// Drop rows whose values sum to zero. Returns the reduced matrix and
    /// the names of the dropped rows.
    pub fn drop_zero_rows(&self) -> (Self, Vec<Box<str>>) {
        let mut keep = vec![];
        let mut dropped = vec![];
        for i in 0..self.nrows() {
            if self.values.row(i).sum() > 0.0 {
                keep.push(i);
            } else {
                dropped.push(self.rows[i].clone());
            }
        }
        (self.select_rows(&keep), dropped)
    }

    pub fn row_sums(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.nrows(),
            (0..self.nrows()).map(|i| self.values.row(i).sum()),
        )
    }

    pub fn col_sums(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.ncols(),
            (0..self.ncols()).map(|j| self.values.column(j).sum()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dmatrix;

    fn names(items: &[&str]) -> Vec<Box<str>> {
        items.iter().map(|s| s.to_string().into_boxed_str()).collect()
    }

    fn small() -> NamedMatrix {
        NamedMatrix::new(
            names(&["g1", "g2", "g3"]),
            names(&["a", "b"]),
            dmatrix![1.0, 2.0; 0.0, 0.0; 3.0, 4.0],
        )
        .unwrap()
    }

    #[test]
    fn zero_rows_are_dropped() {
        let (kept, dropped) = small().drop_zero_rows();
        assert_eq!(kept.nrows(), 2);
        assert_eq!(dropped, names(&["g2"]));
        // every dropped row summed to zero
        assert_eq!(kept.rows, names(&["g1", "g3"]));
    }

    #[test]
    fn column_matching_reorders_and_renames() {
        let mat = small();
        let matched = mat
            .match_columns(&names(&["b", "a"]), &names(&["cond_2", "cond_1"]))
            .unwrap();
        assert_eq!(matched.cols, names(&["cond_2", "cond_1"]));
        assert_eq!(matched.values[(0, 0)], 2.0);
        assert_eq!(matched.values[(0, 1)], 1.0);
    }

    #[test]
    fn missing_column_is_a_mismatch() {
        let mat = small();
        let err = mat
            .match_columns(&names(&["a", "z"]), &names(&["x", "y"]))
            .unwrap_err();
        assert!(matches!(err, DataError::SampleMismatch { .. }));
    }

    #[test]
    fn name_shape_mismatch_rejected() {
        let err = NamedMatrix::new(
            names(&["g1"]),
            names(&["a", "b"]),
            dmatrix![1.0, 2.0; 3.0, 4.0],
        )
        .unwrap_err();
        assert!(matches!(err, DataError::MalformedInput { .. }));
    }

    #[test]
    fn negative_values_are_malformed() {
        let mat = NamedMatrix::new(
            names(&["g1", "g2"]),
            names(&["a", "b"]),
            dmatrix![1.0, 2.0; 3.0, -4.0],
        )
        .unwrap();
        let err = mat.check_non_negative("count").unwrap_err();
        assert!(matches!(err, DataError::MalformedInput { .. }));
        assert!(err.to_string().contains("g2"));
        assert!(small().check_non_negative("count").is_ok());
    }

    #[test]
    fn select_rows_by_name_preserves_order() {
        let mat = small();
        let sub = mat.select_rows_by_name(&names(&["g3", "g1"])).unwrap();
        assert_eq!(sub.rows, names(&["g3", "g1"]));
        assert_eq!(sub.values[(0, 1)], 4.0);
    }
}

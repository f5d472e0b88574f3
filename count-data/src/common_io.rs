//! Gzip-aware buffered line I/O for delimited tables.

use crate::error::{DataError, Result};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Open a buffered reader, decompressing on the fly when the file name
/// ends with `.gz`.
pub fn open_buf_reader(file_path: &str) -> Result<Box<dyn BufRead>> {
    let file = File::open(file_path)?;
    if has_extension(file_path, "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Open a buffered writer, compressing when the file name ends with `.gz`.
pub fn open_buf_writer(file_path: &str) -> Result<Box<dyn Write>> {
    let file = File::create(file_path)?;
    if has_extension(file_path, "gz") {
        let encoder = GzEncoder::new(file, Compression::default());
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Create the parent directory of `file_path` if it does not exist.
pub fn mkdir(file_path: &str) -> Result<()> {
    if let Some(dir) = Path::new(file_path).parent() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn has_extension(file_path: &str, ext: &str) -> bool {
    Path::new(file_path)
        .extension()
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Pick the field delimiter from the file name: `.tsv[.gz]` means tab,
/// anything else is treated as comma-delimited.
pub fn delimiter_for(file_path: &str) -> char {
    let stem = file_path.strip_suffix(".gz").unwrap_or(file_path);
    if has_extension(stem, "tsv") || has_extension(stem, "txt") {
        '\t'
    } else {
        ','
    }
}

/// Read every line of `file_path` into memory, skipping blank lines.
pub fn read_lines(file_path: &str) -> Result<Vec<Box<str>>> {
    let buf = open_buf_reader(file_path)?;
    let mut lines = vec![];
    for line in buf.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line.into_boxed_str());
        }
    }
    Ok(lines)
}

/// Write one displayable item per line into `file_path`.
pub fn write_lines<T: std::fmt::Display>(lines: &[T], file_path: &str) -> Result<()> {
    let mut buf = open_buf_writer(file_path)?;
    for line in lines {
        writeln!(buf, "{}", line)?;
    }
    buf.flush()?;
    Ok(())
}

/// A delimited table split into a header row and body rows of string
/// fields. Comment lines (`#`) are dropped.
#[derive(Debug)]
pub struct DelimTable {
    pub header: Vec<Box<str>>,
    pub rows: Vec<Vec<Box<str>>>,
}

impl DelimTable {
    /// Read `file_path` as a delimited table with a mandatory header line.
    pub fn read(file_path: &str) -> Result<Self> {
        let delim = delimiter_for(file_path);
        let mut lines = read_lines(file_path)?
            .into_iter()
            .filter(|line| !line.starts_with('#'));

        let header_line = lines.next().ok_or_else(|| DataError::MalformedInput {
            reason: format!("{} is empty", file_path),
        })?;

        let header = split_fields(&header_line, delim);
        let ncols = header.len();

        let mut rows = vec![];
        for (i, line) in lines.enumerate() {
            let fields = split_fields(&line, delim);
            if fields.len() != ncols {
                return Err(DataError::MalformedInput {
                    reason: format!(
                        "{} line {} has {} fields, header has {}",
                        file_path,
                        i + 2,
                        fields.len(),
                        ncols
                    ),
                });
            }
            rows.push(fields);
        }

        Ok(DelimTable { header, rows })
    }

    /// Position of a named header column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.as_ref() == name)
    }
}

fn split_fields(line: &str, delim: char) -> Vec<Box<str>> {
    line.split(delim)
        .map(|field| field.trim().to_string().into_boxed_str())
        .collect()
}

/// Parse one string field as `f64`, reporting the offending token and
/// 1-based line number on failure.
pub fn parse_field(token: &str, line: usize) -> Result<f64> {
    token.parse::<f64>().map_err(|_| DataError::Parse {
        token: token.to_string(),
        line,
    })
}

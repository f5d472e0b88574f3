use thiserror::Error;

/// Errors raised while loading tabular expression data. All of them are
/// fatal to a run; there is no partial-result mode.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error("sample '{sample}' from the plan has no matching column")]
    SampleMismatch { sample: String },

    #[error("failed to parse '{token}' at line {line} as a number")]
    Parse { token: String, line: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DataError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("design matrix is rank deficient: {reason}")]
    DesignRankDeficient { reason: String },

    #[error("empty input: {reason}")]
    EmptyInput { reason: String },

    #[error("matrices are not aligned: {reason}")]
    ShapeMismatch { reason: String },

    #[error("numerical failure in {operation}: {details}")]
    Numerical { operation: String, details: String },
}

pub type Result<T> = std::result::Result<T, StatsError>;

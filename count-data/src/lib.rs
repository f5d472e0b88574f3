//! Named gene-by-sample expression matrices.
//!
//! Dense `f64` matrices carrying gene (row) and sample (column) names,
//! gzip-aware delimited I/O, and the sample plan describing the
//! experimental layout.

pub mod common_io;
pub mod error;
pub mod named;
pub mod sample_plan;

pub use error::DataError;
pub use named::NamedMatrix;
pub use sample_plan::{SamplePlan, SampleRecord};

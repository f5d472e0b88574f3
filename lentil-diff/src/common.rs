#![allow(dead_code)]

pub use log::{info, warn};

pub use count_data::{NamedMatrix, SamplePlan};

pub type Mat = nalgebra::DMatrix<f64>;
pub type DVec = nalgebra::DVector<f64>;

pub mod arch;
pub mod dataset;
pub mod error;
pub mod optimization;
pub mod params;
pub mod preprocessing;

pub use dataset::City;
pub use error::{MlErr, Result};
pub use params::{ParameterVector, Tensor};

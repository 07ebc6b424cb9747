pub mod activations;
mod health;
pub mod layers;
pub mod loss;
mod model;

pub use health::{HealthArchitecture, HealthNet};
pub use model::{Architecture, Evaluation, FitReport, Model};

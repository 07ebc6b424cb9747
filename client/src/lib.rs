pub mod error;
pub mod session;
pub mod trainer;

pub use error::{ClientErr, Result};
pub use session::{SessionSummary, run_session};
pub use trainer::{EvaluateOutcome, FitOutcome, LocalTrainer, TrainerState};

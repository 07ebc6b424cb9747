use serde::{Deserialize, Serialize};

/// Local training configuration sent with every `Fit` command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSpec {
    /// Full passes over the local train split per round.
    pub local_epochs: usize,
    pub batch_size: usize,
    /// Trailing share of the train split held out to report a validation loss.
    pub validation_split: f32,
    /// Seed for the local shuffling, combined with the round number by the client.
    pub seed: u64,
}

impl Default for FitSpec {
    fn default() -> Self {
        Self {
            local_epochs: 1,
            batch_size: 32,
            validation_split: 0.1,
            seed: 42,
        }
    }
}

use comms::specs::training::FitSpec;

use crate::{ParameterVector, Result, dataset::Samples};

/// The outcome of a local training call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitReport {
    /// Mean of the batch losses over every epoch.
    pub loss: f32,
    /// Loss over the held-out tail of the train split, if any was held out.
    pub val_loss: Option<f32>,
}

/// The outcome of evaluating a model over a set of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub mae: f32,
}

pub trait Model: Send {
    /// Returns the shape of every tensor of the model's parameter vector.
    fn shapes(&self) -> Vec<Vec<usize>>;

    /// Returns a copy of the current parameters.
    fn get_weights(&self) -> ParameterVector;

    /// Overwrites every parameter with `params`.
    ///
    /// # Returns
    /// An error if the shapes of `params` differ from the model's, in which case the
    /// model is left untouched.
    fn set_weights(&mut self, params: &ParameterVector) -> Result<()>;

    /// Trains the model in place over `samples`.
    ///
    /// # Arguments
    /// * `samples` - The training data.
    /// * `config` - Epochs, batch size and validation split.
    /// * `seed` - Seed of the batch shuffling.
    fn fit(&mut self, samples: &Samples, config: &FitSpec, seed: u64) -> Result<FitReport>;

    /// Computes the loss and mean absolute error over `samples` without training.
    fn evaluate(&mut self, samples: &Samples) -> Result<Evaluation>;

    /// Predicts the target of every sample.
    fn predict(&mut self, samples: &Samples) -> Result<Vec<f32>>;
}

/// A recipe for building fresh models of one fixed architecture.
pub trait Architecture: Send + Sync {
    type Model: Model;

    /// Returns the parameter shapes every built model has.
    fn shapes(&self) -> Vec<Vec<usize>>;

    /// Builds a model with freshly initialized parameters.
    fn build(&self, seed: u64) -> Result<Self::Model>;
}

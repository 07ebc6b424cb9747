use std::sync::Arc;

use comms::{msg::Metrics, specs::training::FitSpec};
use log::{debug, info};
use machine_learning::{
    City, ParameterVector,
    arch::{Architecture, Model},
    dataset::{PartitionSource, SPLIT_SEED, Samples, TEST_FRACTION, train_test_split},
    preprocessing::PreprocessorBundle,
};

use crate::{ClientErr, Result};

/// The lifecycle of a `LocalTrainer`.
///
/// `Training` and `Ready` alternate once per round, `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Created,
    DataLoaded,
    Training,
    Ready,
    Done,
}

/// What a client reports after training.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub params: ParameterVector,
    pub sample_count: usize,
    pub metrics: Metrics,
}

/// What a client reports after evaluating.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateOutcome {
    pub loss: f32,
    pub sample_count: usize,
    pub metrics: Metrics,
}

struct LocalData {
    train: Samples,
    test: Samples,
}

/// Trains and evaluates a local replica over one city's partition.
///
/// The partition is loaded on the first `fit` or `evaluate` and preprocessed with the
/// shared bundle, the replica is built on first use and then overwritten every round.
pub struct LocalTrainer<A: Architecture, S: PartitionSource> {
    city: City,
    arch: A,
    source: S,
    bundle: Arc<PreprocessorBundle>,
    model_seed: u64,
    state: TrainerState,
    data: Option<LocalData>,
    model: Option<A::Model>,
}

impl<A: Architecture, S: PartitionSource> LocalTrainer<A, S> {
    /// Creates a new `LocalTrainer`.
    ///
    /// # Arguments
    /// * `city` - The identity of this client, selects the partition.
    /// * `arch` - The architecture to build the replica from.
    /// * `source` - Where the partition is loaded from.
    /// * `bundle` - The preprocessors fitted for this run.
    ///
    /// # Returns
    /// A new trainer in the `Created` state.
    pub fn new(city: City, arch: A, source: S, bundle: Arc<PreprocessorBundle>) -> Self {
        Self {
            city,
            arch,
            source,
            bundle,
            model_seed: 0,
            state: TrainerState::Created,
            data: None,
            model: None,
        }
    }

    pub fn city(&self) -> City {
        self.city
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn bundle(&self) -> &Arc<PreprocessorBundle> {
        &self.bundle
    }

    /// Trains the replica starting from `global`.
    ///
    /// # Arguments
    /// * `round` - The round being trained, mixed into the shuffle seed.
    /// * `global` - The global parameters, they replace the replica's weights.
    /// * `config` - The local training configuration.
    ///
    /// # Returns
    /// The trained parameters and the amount of training samples.
    pub fn fit(
        &mut self,
        round: usize,
        global: &ParameterVector,
        config: &FitSpec,
    ) -> Result<FitOutcome> {
        self.prepare()?;

        self.state = TrainerState::Training;
        let res = self.train(round, global, config);
        self.state = TrainerState::Ready;

        res
    }

    /// Evaluates `global` over the held-out split.
    ///
    /// # Returns
    /// The loss, the amount of test samples and the mean absolute error as `mae`.
    pub fn evaluate(&mut self, round: usize, global: &ParameterVector) -> Result<EvaluateOutcome> {
        let city = self.city;
        let (data, model) = self.prepare()?;

        model.set_weights(global)?;
        let eval = model.evaluate(&data.test)?;
        let sample_count = data.test.len();

        debug!(city = city.as_str(), round = round; "evaluation loss={} mae={}", eval.loss, eval.mae);

        Ok(EvaluateOutcome {
            loss: eval.loss,
            sample_count,
            metrics: Metrics::from([("mae".to_string(), eval.mae)]),
        })
    }

    /// Moves the trainer to its terminal state.
    pub fn finish(&mut self) {
        self.state = TrainerState::Done;
        self.model = None;
    }

    /// Loads the partition and builds the replica if not done yet.
    fn prepare(&mut self) -> Result<(&LocalData, &mut A::Model)> {
        if self.state == TrainerState::Done {
            return Err(ClientErr::Finished);
        }

        let Self {
            city,
            arch,
            source,
            bundle,
            model_seed,
            state,
            data,
            model,
        } = self;

        let data = match data.take() {
            Some(loaded) => data.insert(loaded),
            None => {
                let loaded = load(*city, source, bundle)?;
                if *state == TrainerState::Created {
                    *state = TrainerState::DataLoaded;
                }
                data.insert(loaded)
            }
        };

        let model = match model.take() {
            Some(built) => model.insert(built),
            None => model.insert(arch.build(*model_seed)?),
        };

        Ok((data, model))
    }

    fn train(
        &mut self,
        round: usize,
        global: &ParameterVector,
        config: &FitSpec,
    ) -> Result<FitOutcome> {
        let city = self.city;
        let (data, model) = self.loaded()?;

        model.set_weights(global)?;
        let report = model.fit(&data.train, config, config.seed.wrapping_add(round as u64))?;

        info!(
            city = city.as_str(), round = round, loss = report.loss;
            "local training done, val_loss={:?}", report.val_loss
        );

        Ok(FitOutcome {
            params: model.get_weights(),
            sample_count: data.train.len(),
            metrics: Metrics::new(),
        })
    }

    fn loaded(&mut self) -> Result<(&LocalData, &mut A::Model)> {
        match (&self.data, &mut self.model) {
            (Some(data), Some(model)) => Ok((data, model)),
            _ => Err(ClientErr::Finished),
        }
    }
}

fn load<S: PartitionSource>(
    city: City,
    source: &S,
    bundle: &PreprocessorBundle,
) -> Result<LocalData> {
    let records = source.load_partition(city)?;
    let samples = bundle.transform(&records)?;
    let (train, test) = train_test_split(samples.len(), TEST_FRACTION, SPLIT_SEED);

    info!(
        city = city.as_str(), train = train.len(), test = test.len();
        "local data loaded"
    );

    Ok(LocalData {
        train: samples.select(&train),
        test: samples.select(&test),
    })
}

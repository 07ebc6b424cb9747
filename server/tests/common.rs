#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use comms::{msg::Metrics, specs::training::FitSpec};
use machine_learning::{
    ParameterVector, Result,
    arch::{Architecture, Evaluation, FitReport, Model},
    dataset::{Record, Samples},
    preprocessing::PreprocessorBundle,
};
use server::{
    ProxyErr,
    coordinator::RoundConfig,
    proxy::{ClientEvaluation, ClientProxy, ClientUpdate},
};
use tokio::time::{self, Duration};

pub fn record(city: &str, i: usize) -> Record {
    let x = i as f64;
    Record {
        city: city.to_string(),
        env: [x, x * 2., 3., x % 5., 1., 20. + x, 50., 300., 0.5],
        population_density: ["Rural", "Urban", "Suburban"][i % 3].to_string(),
        wearable: [70. + x, 97., 5000. + x * 10., 7., 16., 36.6],
        hospital_admissions: (i % 7) as f64,
    }
}

pub fn records(city: &str, n: usize) -> Vec<Record> {
    (0..n).map(|i| record(city, i)).collect()
}

pub fn bundle() -> Arc<PreprocessorBundle> {
    Arc::new(PreprocessorBundle::fit(&records("Delhi", 20)).unwrap())
}

pub fn scalar(value: f32) -> ParameterVector {
    ParameterVector::from_flat(&[vec![1]], &[value]).unwrap()
}

pub fn config(rounds: usize, min_clients: usize, fingerprint: &str) -> RoundConfig {
    RoundConfig {
        rounds,
        min_clients,
        round_timeout: Duration::from_millis(50),
        fit: FitSpec::default(),
        fingerprint: fingerprint.to_string(),
    }
}

/// A one-parameter model, enough to persist and reload a vector of shape `[1]`.
#[derive(Clone, Copy, Default)]
pub struct ScalarArch;

pub struct ScalarModel {
    weights: ParameterVector,
}

impl Architecture for ScalarArch {
    type Model = ScalarModel;

    fn shapes(&self) -> Vec<Vec<usize>> {
        vec![vec![1]]
    }

    fn build(&self, _seed: u64) -> Result<ScalarModel> {
        Ok(ScalarModel {
            weights: ParameterVector::zeros(&self.shapes()),
        })
    }
}

impl Model for ScalarModel {
    fn shapes(&self) -> Vec<Vec<usize>> {
        vec![vec![1]]
    }

    fn get_weights(&self) -> ParameterVector {
        self.weights.clone()
    }

    fn set_weights(&mut self, params: &ParameterVector) -> Result<()> {
        params.ensure_shapes(&self.shapes())?;
        self.weights = params.clone();
        Ok(())
    }

    fn fit(&mut self, _samples: &Samples, _config: &FitSpec, _seed: u64) -> Result<FitReport> {
        Ok(FitReport {
            loss: 0.,
            val_loss: None,
        })
    }

    fn evaluate(&mut self, _samples: &Samples) -> Result<Evaluation> {
        Ok(Evaluation { loss: 0., mae: 0. })
    }

    fn predict(&mut self, samples: &Samples) -> Result<Vec<f32>> {
        Ok(vec![self.weights.to_flat()[0]; samples.len()])
    }
}

/// What a scripted client does when asked to fit.
#[derive(Debug, Clone)]
pub enum Step {
    Update { params: ParameterVector, samples: usize },
    Sleep(Duration),
    Report(&'static str),
    Broken,
}

/// A client answering fit requests from a script, one step per round.
pub struct ScriptedClient {
    id: String,
    fingerprint: String,
    steps: VecDeque<Step>,
    pub fits: Arc<AtomicUsize>,
    pub evaluations: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
    pub received: Vec<ParameterVector>,
}

impl ScriptedClient {
    pub fn new(id: &str, fingerprint: &str, steps: Vec<Step>) -> Self {
        Self {
            id: id.to_string(),
            fingerprint: fingerprint.to_string(),
            steps: steps.into(),
            fits: Arc::default(),
            evaluations: Arc::default(),
            disconnects: Arc::default(),
            received: Vec::new(),
        }
    }

    /// A client returning `values[r]` with `samples` samples at round `r + 1`.
    pub fn updates(id: &str, fingerprint: &str, values: &[f32], samples: usize) -> Self {
        let steps = values
            .iter()
            .map(|&v| Step::Update {
                params: scalar(v),
                samples,
            })
            .collect();

        Self::new(id, fingerprint, steps)
    }

    /// A client returning `rounds[r] = (value, samples)` at round `r + 1`.
    pub fn weighted(id: &str, fingerprint: &str, rounds: &[(f32, usize)]) -> Self {
        let steps = rounds
            .iter()
            .map(|&(v, samples)| Step::Update {
                params: scalar(v),
                samples,
            })
            .collect();

        Self::new(id, fingerprint, steps)
    }
}

#[async_trait::async_trait]
impl ClientProxy for ScriptedClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fit(
        &mut self,
        _round: usize,
        params: &ParameterVector,
        _config: &FitSpec,
    ) -> std::result::Result<ClientUpdate, ProxyErr> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        self.received.push(params.clone());

        match self.steps.pop_front() {
            Some(Step::Update { params, samples }) => Ok(ClientUpdate {
                client_id: self.id.clone(),
                params,
                sample_count: samples,
                metrics: Metrics::new(),
                fingerprint: self.fingerprint.clone(),
            }),
            Some(Step::Sleep(duration)) => {
                time::sleep(duration).await;
                Err(ProxyErr::Reported("woke up too late".into()))
            }
            Some(Step::Report(reason)) => Err(ProxyErr::Reported(reason.into())),
            Some(Step::Broken) | None => Err(ProxyErr::Protocol("channel closed".into())),
        }
    }

    async fn evaluate(
        &mut self,
        _round: usize,
        params: &ParameterVector,
    ) -> std::result::Result<ClientEvaluation, ProxyErr> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);

        let loss = params.to_flat()[0];
        let metrics = Metrics::from([("mae".to_string(), loss / 2.)]);

        Ok(ClientEvaluation {
            client_id: self.id.clone(),
            loss,
            sample_count: 1,
            metrics,
        })
    }

    async fn disconnect(&mut self) -> std::result::Result<(), ProxyErr> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

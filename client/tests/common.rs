#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use comms::specs::training::FitSpec;
use machine_learning::{
    ParameterVector, Result,
    arch::{Architecture, Evaluation, FitReport, Model},
    dataset::{MemorySource, Record, Samples},
    preprocessing::PreprocessorBundle,
};

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

pub fn source() -> MemorySource {
    let mut all = records("Delhi", 20);
    all.extend(records("Beijing", 10));
    MemorySource::new(all)
}

pub fn bundle() -> Arc<PreprocessorBundle> {
    let all = records("Delhi", 20);
    Arc::new(PreprocessorBundle::fit(&all).unwrap())
}

/// A model that remembers the weights it held at the start of every `fit`.
pub struct RecordingModel {
    weights: ParameterVector,
    seen: Arc<Mutex<Vec<ParameterVector>>>,
}

#[derive(Clone, Default)]
pub struct RecordingArch {
    pub seen: Arc<Mutex<Vec<ParameterVector>>>,
}

impl Architecture for RecordingArch {
    type Model = RecordingModel;

    fn shapes(&self) -> Vec<Vec<usize>> {
        vec![vec![2]]
    }

    fn build(&self, _seed: u64) -> Result<RecordingModel> {
        Ok(RecordingModel {
            weights: ParameterVector::zeros(&self.shapes()),
            seen: self.seen.clone(),
        })
    }
}

impl Model for RecordingModel {
    fn shapes(&self) -> Vec<Vec<usize>> {
        vec![vec![2]]
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
        self.seen.lock().unwrap().push(self.weights.clone());

        for tensor in self.weights.tensors_mut() {
            tensor.data_mut().iter_mut().for_each(|w| *w += 1.);
        }

        Ok(FitReport {
            loss: 0.,
            val_loss: None,
        })
    }

    fn evaluate(&mut self, samples: &Samples) -> Result<Evaluation> {
        Ok(Evaluation {
            loss: self.weights.to_flat().iter().sum(),
            mae: samples.len() as f32,
        })
    }

    fn predict(&mut self, samples: &Samples) -> Result<Vec<f32>> {
        Ok(vec![0.; samples.len()])
    }
}

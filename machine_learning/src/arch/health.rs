//! The multi-branch health-risk regressor.
//!
//! Three input branches are merged into a shared head:
//!
//! ```text
//! env (9)       -> Dense(32, relu) -> Dense(16, relu) --+
//! text (index)  -> Embedding(3, 4) -> Dense(4, relu)  --+-> concat(28) -> Dense(32, relu) -> Dense(1)
//! wearable (6)  -> Dense(8, relu)  ---------------------+
//! ```
//!
//! All parameters live in one flat buffer in parameter vector order: for every layer
//! above, top to bottom and left to right, the kernel followed by the bias, with the
//! embedding table as a single tensor.

use std::mem;

use comms::specs::training::FitSpec;
use log::debug;
use ndarray::{Array2, Axis, concatenate};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use rand_distr::{Distribution, Uniform};

use super::{
    Architecture, Evaluation, FitReport, Model,
    activations::ActFn,
    layers::{Dense, Embedding},
    loss::{LossFn, Mse, mae},
};
use crate::{
    MlErr, ParameterVector, Result, Tensor,
    dataset::{ENV_FEATURES, POPULATION_CLASSES, Samples, WEARABLE_FEATURES},
    optimization::Adam,
};

const ENV_HIDDEN: usize = 32;
const ENV_OUT: usize = 16;
const EMBEDDING_WIDTH: usize = 4;
const TEXT_OUT: usize = 4;
const WEARABLE_OUT: usize = 8;
const HEAD_HIDDEN: usize = 32;
const EMBEDDING_RANGE: f32 = 0.05;

/// Amount of layers, each one owning a contiguous segment of the parameter buffer.
const SEGMENTS: usize = 7;

/// Builds `HealthNet`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthArchitecture;

impl Architecture for HealthArchitecture {
    type Model = HealthNet;

    fn shapes(&self) -> Vec<Vec<usize>> {
        HealthNet::blank().shapes()
    }

    fn build(&self, seed: u64) -> Result<HealthNet> {
        let mut net = HealthNet::blank();
        net.initialize(&mut StdRng::seed_from_u64(seed))?;
        Ok(net)
    }
}

#[derive(Debug, Clone)]
pub struct HealthNet {
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: Adam,
    loss_fn: Mse,

    env_hidden: Dense,
    env_out: Dense,
    embedding: Embedding,
    text_out: Dense,
    wearable_out: Dense,
    head_hidden: Dense,
    output: Dense,
}

impl HealthNet {
    /// Creates a net with every parameter set to zero.
    fn blank() -> Self {
        let relu = Some(ActFn::relu());

        let env_hidden = Dense::new((ENV_FEATURES.len(), ENV_HIDDEN), relu);
        let env_out = Dense::new((ENV_HIDDEN, ENV_OUT), relu);
        let embedding = Embedding::new((POPULATION_CLASSES.len(), EMBEDDING_WIDTH));
        let text_out = Dense::new((EMBEDDING_WIDTH, TEXT_OUT), relu);
        let wearable_out = Dense::new((WEARABLE_FEATURES.len(), WEARABLE_OUT), relu);
        let head_hidden = Dense::new((ENV_OUT + TEXT_OUT + WEARABLE_OUT, HEAD_HIDDEN), relu);
        let output = Dense::new((HEAD_HIDDEN, 1), None);

        let size = [
            env_hidden.size(),
            env_out.size(),
            embedding.size(),
            text_out.size(),
            wearable_out.size(),
            head_hidden.size(),
            output.size(),
        ]
        .iter()
        .sum();

        Self {
            params: vec![0.; size],
            grad: vec![0.; size],
            optimizer: Adam::with_defaults(size),
            loss_fn: Mse::new(),
            env_hidden,
            env_out,
            embedding,
            text_out,
            wearable_out,
            head_hidden,
            output,
        }
    }

    fn sizes(&self) -> [usize; SEGMENTS] {
        [
            self.env_hidden.size(),
            self.env_out.size(),
            self.embedding.size(),
            self.text_out.size(),
            self.wearable_out.size(),
            self.head_hidden.size(),
            self.output.size(),
        ]
    }

    /// Draws Glorot uniform kernels, a uniform embedding table and zero biases.
    fn initialize<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        let sizes = self.sizes();
        let Self {
            params,
            env_hidden,
            env_out,
            embedding,
            text_out,
            wearable_out,
            head_hidden,
            output,
            ..
        } = self;

        let [p_eh, p_eo, p_emb, p_to, p_w, p_hh, p_out] = carve_mut(params, sizes);

        glorot_uniform(env_hidden, p_eh, rng)?;
        glorot_uniform(env_out, p_eo, rng)?;

        let dist = uniform(-EMBEDDING_RANGE, EMBEDDING_RANGE)?;
        debug_assert_eq!(p_emb.len(), embedding.size());
        p_emb.iter_mut().for_each(|w| *w = dist.sample(rng));

        glorot_uniform(text_out, p_to, rng)?;
        glorot_uniform(wearable_out, p_w, rng)?;
        glorot_uniform(head_hidden, p_hh, rng)?;
        glorot_uniform(output, p_out, rng)
    }

    /// Makes a forward pass over every sample, caching what `backward` needs.
    fn forward(&mut self, samples: &Samples) -> Result<Array2<f32>> {
        let sizes = self.sizes();
        let Self {
            params,
            env_hidden,
            env_out,
            embedding,
            text_out,
            wearable_out,
            head_hidden,
            output,
            ..
        } = self;

        let [p_eh, p_eo, p_emb, p_to, p_w, p_hh, p_out] = carve(params, sizes);

        let h = env_hidden.forward(p_eh, samples.env())?;
        let env = env_out.forward(p_eo, h)?;

        let e = embedding.forward(p_emb, samples.text())?;
        let text = text_out.forward(p_to, e)?;

        let wearable = wearable_out.forward(p_w, samples.wearable())?;

        let joined = concatenate(Axis(1), &[env, text, wearable]).map_err(|_| {
            MlErr::SizeMismatch {
                what: "branch outputs",
                got: samples.len(),
                expected: samples.len(),
            }
        })?;

        let h = head_hidden.forward(p_hh, joined.view())?;
        Ok(output.forward(p_out, h)?.to_owned())
    }

    /// Backpropagates the loss of the last `forward` into the gradient buffer.
    fn backward(&mut self, y_pred: &Array2<f32>, samples: &Samples) -> Result<()> {
        let sizes = self.sizes();
        let Self {
            params,
            grad,
            loss_fn,
            env_hidden,
            env_out,
            embedding,
            text_out,
            wearable_out,
            head_hidden,
            output,
            ..
        } = self;

        let [p_eh, p_eo, _, p_to, p_w, p_hh, p_out] = carve(params, sizes);
        let [g_eh, g_eo, g_emb, g_to, g_w, g_hh, g_out] = carve_mut(grad, sizes);

        let mut d_last = loss_fn.loss_prime(y_pred.view(), samples.target());
        let d = output.backward(p_out, g_out, d_last.view_mut())?;
        let d = head_hidden.backward(p_hh, g_hh, d)?;

        let (d_env, rest) = d.split_at(Axis(1), ENV_OUT);
        let (d_text, d_wearable) = rest.split_at(Axis(1), TEXT_OUT);

        let d = env_out.backward(p_eo, g_eo, d_env)?;
        env_hidden.backward(p_eh, g_eh, d)?;

        let d = text_out.backward(p_to, g_to, d_text)?;
        embedding.backward(g_emb, d.view())?;

        wearable_out.backward(p_w, g_w, d_wearable)?;
        Ok(())
    }
}

impl Model for HealthNet {
    fn shapes(&self) -> Vec<Vec<usize>> {
        let mut shapes = Vec::with_capacity(2 * SEGMENTS - 1);
        shapes.extend(self.env_hidden.shapes());
        shapes.extend(self.env_out.shapes());
        shapes.push(self.embedding.shape());
        shapes.extend(self.text_out.shapes());
        shapes.extend(self.wearable_out.shapes());
        shapes.extend(self.head_hidden.shapes());
        shapes.extend(self.output.shapes());
        shapes
    }

    fn get_weights(&self) -> ParameterVector {
        let mut rest = self.params.as_slice();

        let tensors = self
            .shapes()
            .into_iter()
            .map(|shape| {
                let mut tensor = Tensor::zeros(shape);
                let (head, tail) = rest.split_at(tensor.len());
                tensor.data_mut().copy_from_slice(head);
                rest = tail;
                tensor
            })
            .collect();

        ParameterVector::new(tensors)
    }

    fn set_weights(&mut self, params: &ParameterVector) -> Result<()> {
        params.ensure_shapes(&self.shapes())?;
        params.flatten_into(&mut self.params);
        Ok(())
    }

    // NOTE: the returned loss is the mean of the batch losses taken while the weights were
    // still moving, not a loss of the final weights.
    fn fit(&mut self, samples: &Samples, config: &FitSpec, seed: u64) -> Result<FitReport> {
        if config.batch_size == 0 {
            return Err(MlErr::InvalidConfig("batch size must be positive".to_string()));
        }

        if !(0.0..1.0).contains(&config.validation_split) {
            return Err(MlErr::InvalidConfig(format!(
                "validation split {} is not in [0, 1)",
                config.validation_split
            )));
        }

        let n = samples.len();
        if n == 0 {
            return Err(MlErr::EmptySplit("train"));
        }

        // The validation rows are the tail of the split, taken before shuffling.
        let mut split = (n as f64 * (1. - config.validation_split as f64)) as usize;
        if split == 0 {
            split = n;
        }

        let mut order: Vec<_> = (0..split).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut total_loss = 0.;
        let mut num_batches = 0;

        for _ in 0..config.local_epochs {
            order.shuffle(&mut rng);

            for chunk in order.chunks(config.batch_size) {
                let batch = samples.select(chunk);

                let y_pred = self.forward(&batch)?;
                total_loss += self.loss_fn.loss(y_pred.view(), batch.target());
                num_batches += 1;

                self.backward(&y_pred, &batch)?;
                self.optimizer.step(&mut self.params, &self.grad)?;
            }
        }

        let val_loss = if split < n {
            let held_out: Vec<_> = (split..n).collect();
            Some(self.evaluate(&samples.select(&held_out))?.loss)
        } else {
            None
        };

        let loss = if num_batches == 0 {
            0.
        } else {
            total_loss / num_batches as f32
        };
        debug!(samples = split, batches = num_batches, loss = loss; "local training done");

        Ok(FitReport { loss, val_loss })
    }

    fn evaluate(&mut self, samples: &Samples) -> Result<Evaluation> {
        if samples.is_empty() {
            return Err(MlErr::EmptySplit("evaluation"));
        }

        let y_pred = self.forward(samples)?;

        Ok(Evaluation {
            loss: self.loss_fn.loss(y_pred.view(), samples.target()),
            mae: mae(y_pred.view(), samples.target()),
        })
    }

    fn predict(&mut self, samples: &Samples) -> Result<Vec<f32>> {
        Ok(self.forward(samples)?.column(0).to_vec())
    }
}

fn uniform(low: f32, high: f32) -> Result<Uniform<f32>> {
    Uniform::new(low, high).map_err(|e| MlErr::InvalidConfig(e.to_string()))
}

fn glorot_uniform<R: Rng>(dense: &Dense, params: &mut [f32], rng: &mut R) -> Result<()> {
    let (fan_in, fan_out) = dense.dim();
    let range = (6. / (fan_in + fan_out) as f32).sqrt();
    let dist = uniform(-range, range)?;

    let (kernel, bias) = params.split_at_mut(fan_in * fan_out);
    kernel.iter_mut().for_each(|w| *w = dist.sample(rng));
    bias.fill(0.);
    Ok(())
}

/// Splits `buf` into consecutive segments of the given sizes.
fn carve<const N: usize>(mut buf: &[f32], sizes: [usize; N]) -> [&[f32]; N] {
    sizes.map(|size| {
        let (head, tail) = mem::take(&mut buf).split_at(size);
        buf = tail;
        head
    })
}

fn carve_mut<const N: usize>(mut buf: &mut [f32], sizes: [usize; N]) -> [&mut [f32]; N] {
    sizes.map(|size| {
        let (head, tail) = mem::take(&mut buf).split_at_mut(size);
        buf = tail;
        head
    })
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};

    use super::*;

    fn samples(n: usize) -> Samples {
        let env = Array2::from_shape_fn((n, 9), |(i, j)| ((i * 7 + j) % 5) as f32 / 5. - 0.4);
        let text = (0..n).map(|i| i % 3).collect();
        let wearable = Array2::from_shape_fn((n, 6), |(i, j)| ((i + 2 * j) % 4) as f32 / 4. - 0.3);
        let target = Array1::from_iter((0..n).map(|i| (i % 4) as f32)).insert_axis(Axis(1));
        Samples::new(env, text, wearable, target).unwrap()
    }

    #[test]
    fn parameter_vector_layout() {
        let shapes = HealthArchitecture.shapes();

        assert_eq!(shapes.len(), 13);
        assert_eq!(shapes[0], vec![9, 32]);
        assert_eq!(shapes[4], vec![3, 4]);
        assert_eq!(shapes[9], vec![28, 32]);
        assert_eq!(shapes[12], vec![1]);
    }

    #[test]
    fn build_is_deterministic_per_seed() {
        let one = HealthArchitecture.build(42).unwrap().get_weights();
        let two = HealthArchitecture.build(42).unwrap().get_weights();
        let other = HealthArchitecture.build(7).unwrap().get_weights();

        assert_eq!(one, two);
        assert_ne!(one, other);
        // biases start at zero
        assert!(one.tensors()[1].data().iter().all(|&b| b == 0.));
        assert!(one.tensors()[4].data().iter().all(|w| w.abs() <= EMBEDDING_RANGE));
    }

    #[test]
    fn set_weights_rejects_other_shapes() {
        let mut net = HealthArchitecture.build(1).unwrap();
        let before = net.get_weights();

        let wrong = ParameterVector::zeros(&[vec![9, 32]]);
        assert!(net.set_weights(&wrong).is_err());
        assert_eq!(net.get_weights(), before);
    }

    #[test]
    fn weights_round_trip_through_set() {
        let mut net = HealthArchitecture.build(1).unwrap();
        let other = HealthArchitecture.build(2).unwrap().get_weights();

        net.set_weights(&other).unwrap();
        assert_eq!(net.get_weights(), other);
    }

    #[test]
    fn training_lowers_the_loss() {
        let data = samples(64);
        let mut net = HealthArchitecture.build(3).unwrap();
        let config = FitSpec {
            local_epochs: 30,
            batch_size: 16,
            validation_split: 0.,
            seed: 0,
        };

        let before = net.evaluate(&data).unwrap().loss;
        net.fit(&data, &config, 0).unwrap();
        let after = net.evaluate(&data).unwrap().loss;

        assert!(after < before, "loss went from {before} to {after}");
    }

    #[test]
    fn fit_reports_validation_loss_when_holding_out() {
        let data = samples(20);
        let mut net = HealthArchitecture.build(3).unwrap();

        let report = net.fit(&data, &FitSpec::default(), 0).unwrap();
        assert!(report.val_loss.is_some());
        assert!(report.loss.is_finite());
    }

    #[test]
    fn fit_changes_weights_and_predict_has_one_value_per_sample() {
        let data = samples(10);
        let mut net = HealthArchitecture.build(5).unwrap();
        let before = net.get_weights();

        net.fit(&data, &FitSpec::default(), 0).unwrap();
        assert_ne!(net.get_weights(), before);
        assert_eq!(net.predict(&data).unwrap().len(), 10);
    }

    #[test]
    fn empty_evaluation_is_rejected() {
        let mut net = HealthArchitecture.build(5).unwrap();
        let empty = samples(4).select(&[]);
        assert!(matches!(net.evaluate(&empty), Err(MlErr::EmptySplit(_))));
    }

    #[test]
    fn numeric_gradient_agrees_with_backward() {
        let data = samples(5);
        let mut net = HealthArchitecture.build(11).unwrap();

        let y_pred = net.forward(&data).unwrap();
        net.backward(&y_pred, &data).unwrap();
        let analytic = net.grad.clone();

        let eps = 1e-3;
        // first env kernel weight, embedding table start and output bias
        for index in [0, net.sizes()[..2].iter().sum::<usize>(), net.params.len() - 1] {
            let original = net.params[index];

            net.params[index] = original + eps;
            let plus = net.evaluate(&data).unwrap().loss;
            net.params[index] = original - eps;
            let minus = net.evaluate(&data).unwrap().loss;
            net.params[index] = original;

            let numeric = (plus - minus) / (2. * eps);
            assert!(
                (numeric - analytic[index]).abs() < 1e-2 + 0.05 * numeric.abs(),
                "param {index}: numeric {numeric} vs analytic {}",
                analytic[index]
            );
        }
    }
}

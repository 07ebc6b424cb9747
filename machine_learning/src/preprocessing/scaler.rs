use comms::specs::preprocessing::ScalerSpec;
use ndarray::ArrayViewMut1;

use crate::{MlErr, Result};

/// Standardizes every feature to zero mean and unit variance.
///
/// The variance is the population one. A feature with zero variance is only centered.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    features: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
    samples_seen: usize,
}

impl StandardScaler {
    /// Creates an unfitted scaler over `features`.
    pub fn new(features: &[&str]) -> Self {
        Self {
            features: features.iter().map(|f| f.to_string()).collect(),
            mean: Vec::new(),
            scale: Vec::new(),
            samples_seen: 0,
        }
    }

    /// Fits a scaler over the given rows.
    ///
    /// # Arguments
    /// * `features` - The name of every column, in row order.
    /// * `rows` - The rows to compute the statistics over.
    ///
    /// # Returns
    /// The fitted scaler or an error if there are no rows or a row has the wrong width.
    pub fn fit<'a, I>(features: &[&str], rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let width = features.len();
        let rows: Vec<_> = rows.into_iter().collect();

        if rows.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        let mut mean = vec![0.; width];
        for row in &rows {
            if row.len() != width {
                return Err(MlErr::SizeMismatch {
                    what: "scaler row",
                    got: row.len(),
                    expected: width,
                });
            }

            mean.iter_mut().zip(*row).for_each(|(m, x)| *m += x);
        }

        let n = rows.len() as f64;
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.; width];
        for row in &rows {
            var.iter_mut()
                .zip(*row)
                .zip(&mean)
                .for_each(|((v, x), m)| *v += (x - m).powi(2));
        }

        let scale = var
            .into_iter()
            .map(|v| match (v / n).sqrt() {
                s if s == 0. => 1.,
                s => s,
            })
            .collect();

        Ok(Self {
            features: features.iter().map(|f| f.to_string()).collect(),
            mean,
            scale,
            samples_seen: rows.len(),
        })
    }

    /// Rebuilds a scaler from its fitted state.
    pub fn from_spec(spec: ScalerSpec) -> Result<Self> {
        let width = spec.features.len();
        for (what, got) in [("scaler mean", spec.mean.len()), ("scaler scale", spec.scale.len())] {
            if got != width && got != 0 {
                return Err(MlErr::SizeMismatch {
                    what,
                    got,
                    expected: width,
                });
            }
        }

        if spec.scale.iter().any(|s| !(s.is_finite() && *s > 0.)) {
            return Err(MlErr::InvalidConfig(
                "scaler scales must be finite and positive".to_string(),
            ));
        }

        Ok(Self {
            features: spec.features,
            mean: spec.mean,
            scale: spec.scale,
            samples_seen: spec.samples_seen,
        })
    }

    pub fn spec(&self) -> ScalerSpec {
        ScalerSpec {
            features: self.features.clone(),
            mean: self.mean.clone(),
            scale: self.scale.clone(),
            samples_seen: self.samples_seen,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.samples_seen > 0
            && self.mean.len() == self.features.len()
            && self.scale.len() == self.features.len()
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn samples_seen(&self) -> usize {
        self.samples_seen
    }

    /// Standardizes `row` into `out`.
    ///
    /// # Returns
    /// `MlErr::PreprocessorNotInitialized` if unfitted or `MlErr::SizeMismatch` on a width mismatch.
    pub fn transform_into(&self, row: &[f64], mut out: ArrayViewMut1<f32>) -> Result<()> {
        if !self.is_fitted() {
            return Err(MlErr::PreprocessorNotInitialized("standard scaler"));
        }

        if row.len() != self.mean.len() || out.len() != self.mean.len() {
            return Err(MlErr::SizeMismatch {
                what: "scaler row",
                got: row.len(),
                expected: self.mean.len(),
            });
        }

        for (((o, x), m), s) in out.iter_mut().zip(row).zip(&self.mean).zip(&self.scale) {
            *o = ((x - m) / s) as f32;
        }

        Ok(())
    }
}

use comms::specs::preprocessing::BundleSpec;
use ndarray::{Array2, Axis};
use sha3::{Digest, Sha3_256};

use super::{LabelEncoder, StandardScaler};
use crate::{
    MlErr, Result,
    dataset::{ENV_FEATURES, POPULATION_CLASSES, Record, Samples, TEXT_FEATURE, WEARABLE_FEATURES},
};

/// The preprocessors that must travel with a model: both scalers and the text encoder.
///
/// A bundle is immutable once built. Sharing one instance (behind an `Arc`) is how every
/// participant of a run ends up with the same fitted values, and the fingerprint is how
/// remote participants prove it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessorBundle {
    env_scaler: StandardScaler,
    wearable_scaler: StandardScaler,
    text_encoder: LabelEncoder,
    fingerprint: String,
}

impl PreprocessorBundle {
    /// Assembles a bundle from its parts, fitted or not.
    pub fn new(
        env_scaler: StandardScaler,
        wearable_scaler: StandardScaler,
        text_encoder: LabelEncoder,
    ) -> Self {
        let fingerprint = fingerprint(&env_scaler, &wearable_scaler, &text_encoder);

        Self {
            env_scaler,
            wearable_scaler,
            text_encoder,
            fingerprint,
        }
    }

    /// Fits every preprocessor over `records`.
    ///
    /// The text encoder is fitted over the full class list, not the observed labels, so
    /// that its indices don't depend on which rows are present.
    pub fn fit(records: &[Record]) -> Result<Self> {
        let env_scaler = StandardScaler::fit(&ENV_FEATURES, records.iter().map(|r| r.env.as_slice()))?;
        let wearable_scaler =
            StandardScaler::fit(&WEARABLE_FEATURES, records.iter().map(|r| r.wearable.as_slice()))?;
        let text_encoder = LabelEncoder::fit(TEXT_FEATURE, POPULATION_CLASSES);

        Ok(Self::new(env_scaler, wearable_scaler, text_encoder))
    }

    /// Rebuilds a bundle received from elsewhere.
    ///
    /// # Returns
    /// The bundle or an error if the state is malformed or any preprocessor is unfitted.
    pub fn from_spec(spec: BundleSpec) -> Result<Self> {
        let bundle = Self::new(
            StandardScaler::from_spec(spec.env_scaler)?,
            StandardScaler::from_spec(spec.wearable_scaler)?,
            LabelEncoder::from_spec(spec.text_encoder)?,
        );

        bundle.ensure_fitted()?;
        Ok(bundle)
    }

    pub fn spec(&self) -> BundleSpec {
        BundleSpec {
            env_scaler: self.env_scaler.spec(),
            wearable_scaler: self.wearable_scaler.spec(),
            text_encoder: self.text_encoder.spec(),
        }
    }

    /// Checks that every preprocessor is fitted.
    ///
    /// # Returns
    /// `MlErr::PreprocessorNotInitialized` naming the first unfitted preprocessor.
    pub fn ensure_fitted(&self) -> Result<()> {
        if !self.env_scaler.is_fitted() {
            return Err(MlErr::PreprocessorNotInitialized("env scaler"));
        }

        if !self.wearable_scaler.is_fitted() {
            return Err(MlErr::PreprocessorNotInitialized("wearable scaler"));
        }

        if !self.text_encoder.is_fitted() {
            return Err(MlErr::PreprocessorNotInitialized("text encoder"));
        }

        Ok(())
    }

    /// The hex SHA3-256 digest of the fitted values.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn env_scaler(&self) -> &StandardScaler {
        &self.env_scaler
    }

    pub fn wearable_scaler(&self) -> &StandardScaler {
        &self.wearable_scaler
    }

    pub fn text_encoder(&self) -> &LabelEncoder {
        &self.text_encoder
    }

    /// Turns records into model inputs.
    pub fn transform(&self, records: &[Record]) -> Result<Samples> {
        self.ensure_fitted()?;

        let n = records.len();
        let mut env = Array2::zeros((n, ENV_FEATURES.len()));
        let mut wearable = Array2::zeros((n, WEARABLE_FEATURES.len()));
        let mut text = Vec::with_capacity(n);
        let mut target = Array2::zeros((n, 1));

        for (i, record) in records.iter().enumerate() {
            self.env_scaler
                .transform_into(&record.env, env.index_axis_mut(Axis(0), i))?;
            self.wearable_scaler
                .transform_into(&record.wearable, wearable.index_axis_mut(Axis(0), i))?;
            text.push(self.text_encoder.transform(&record.population_density)?);
            target[[i, 0]] = record.hospital_admissions as f32;
        }

        Samples::new(env, text, wearable, target)
    }
}

/// Hashes every serialized field, lists are length-prefixed so no two states collide.
fn fingerprint(env: &StandardScaler, wearable: &StandardScaler, encoder: &LabelEncoder) -> String {
    fn text(hasher: &mut Sha3_256, value: &str) {
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }

    fn count(hasher: &mut Sha3_256, n: usize) {
        hasher.update((n as u64).to_be_bytes());
    }

    let mut hasher = Sha3_256::new();

    for scaler in [env, wearable] {
        count(&mut hasher, scaler.features().len());
        for name in scaler.features() {
            text(&mut hasher, name);
        }

        for values in [scaler.mean(), scaler.scale()] {
            count(&mut hasher, values.len());
            for value in values {
                hasher.update(value.to_be_bytes());
            }
        }

        count(&mut hasher, scaler.samples_seen());
    }

    text(&mut hasher, encoder.feature());
    count(&mut hasher, encoder.classes().len());
    for class in encoder.classes() {
        text(&mut hasher, class);
    }

    hex::encode(hasher.finalize())
}

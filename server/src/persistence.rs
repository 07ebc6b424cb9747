//! The artifact set: model weights plus the preprocessors they were trained with.
//!
//! The five files of a set are written into a staging directory next to the target and
//! renamed into place, so a reader either sees a complete set or the previous one.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use comms::specs::preprocessing::{EncoderSpec, ScalerSpec};
use log::{info, warn};
use machine_learning::{
    ParameterVector, Tensor,
    arch::{Architecture, Model},
    dataset::Record,
    preprocessing::{LabelEncoder, PreprocessorBundle, StandardScaler},
};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    CoordinatorErr, PersistErr,
    coordinator::{CompletionListener, TrainingHistory},
};

pub const MODEL_FILE: &str = "health_model.safetensors";
pub const ENV_SCALER_FILE: &str = "env_scaler.json";
pub const WEARABLE_SCALER_FILE: &str = "wearable_scaler.json";
pub const TEXT_ENCODER_FILE: &str = "text_encoder.json";
pub const MANIFEST_FILE: &str = "manifest.json";

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorEntry {
    pub name: String,
    pub shape: Vec<usize>,
}

/// Ties the files of a set together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub fingerprint: String,
    pub rounds: usize,
    pub tensors: Vec<TensorEntry>,
    pub history: TrainingHistory,
}

/// Saves the final model of a run together with its preprocessors.
pub struct PersistenceWriter<A: Architecture> {
    dir: PathBuf,
    arch: A,
    bundle: Arc<PreprocessorBundle>,
    expected: String,
}

impl<A: Architecture> PersistenceWriter<A> {
    /// Creates a writer expecting `bundle` to keep the fingerprint it has now.
    pub fn new<P: Into<PathBuf>>(dir: P, arch: A, bundle: Arc<PreprocessorBundle>) -> Self {
        let expected = bundle.fingerprint().to_string();
        Self::with_fingerprint(dir, arch, bundle, expected)
    }

    /// Creates a writer expecting the bundle the clients were sent, identified by `fingerprint`.
    pub fn with_fingerprint<P: Into<PathBuf>>(
        dir: P,
        arch: A,
        bundle: Arc<PreprocessorBundle>,
        fingerprint: String,
    ) -> Self {
        Self {
            dir: dir.into(),
            arch,
            bundle,
            expected: fingerprint,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the artifact set for `params`.
    ///
    /// # Arguments
    /// * `params` - The final global parameters.
    /// * `history` - The history of the run, kept in the manifest.
    ///
    /// # Errors
    /// * `PersistErr::Ml` if `params` doesn't fit the architecture or a preprocessor is unfitted.
    /// * `PersistErr::FingerprintMismatch` if the bundle isn't the one training used.
    /// * `PersistErr::Io` if writing fails, in which case the target directory is untouched.
    pub fn save(&self, params: &ParameterVector, history: &TrainingHistory) -> Result<(), PersistErr> {
        let mut model = self.arch.build(0)?;
        model.set_weights(params)?;

        self.bundle.ensure_fitted()?;

        let recomputed = PreprocessorBundle::new(
            self.bundle.env_scaler().clone(),
            self.bundle.wearable_scaler().clone(),
            self.bundle.text_encoder().clone(),
        );

        if recomputed.fingerprint() != self.expected {
            return Err(PersistErr::FingerprintMismatch {
                expected: self.expected.clone(),
                got: recomputed.fingerprint().to_string(),
            });
        }

        let weights = model.get_weights();
        let tensors: Vec<TensorEntry> = weights
            .tensors()
            .iter()
            .enumerate()
            .map(|(index, tensor)| TensorEntry {
                name: tensor_name(index),
                shape: tensor.shape().to_vec(),
            })
            .collect();

        let manifest = Manifest {
            version: MANIFEST_VERSION,
            fingerprint: self.expected.clone(),
            rounds: history.rounds.len(),
            tensors,
            history: history.clone(),
        };

        let spec = self.bundle.spec();
        let files = [
            (MODEL_FILE, encode_weights(&weights, &self.expected)?),
            (ENV_SCALER_FILE, serde_json::to_vec_pretty(&spec.env_scaler)?),
            (WEARABLE_SCALER_FILE, serde_json::to_vec_pretty(&spec.wearable_scaler)?),
            (TEXT_ENCODER_FILE, serde_json::to_vec_pretty(&spec.text_encoder)?),
            (MANIFEST_FILE, serde_json::to_vec_pretty(&manifest)?),
        ];

        write_atomically(&self.dir, &files)?;

        info!(
            fingerprint = self.expected.as_str(),
            params = weights.num_params();
            "saved the artifact set to {}",
            self.dir.display()
        );
        Ok(())
    }
}

impl<A: Architecture> CompletionListener for PersistenceWriter<A> {
    fn on_complete(
        &mut self,
        params: &ParameterVector,
        history: &TrainingHistory,
    ) -> Result<(), CoordinatorErr> {
        Ok(self.save(params, history)?)
    }
}

/// A loaded artifact set, ready to predict.
pub struct ModelArtifacts<M: Model> {
    model: M,
    bundle: PreprocessorBundle,
    manifest: Manifest,
}

impl<M: Model> ModelArtifacts<M> {
    /// Loads the artifact set in `dir`.
    ///
    /// Every file must be present and they must agree with each other, a partial or
    /// mixed set is rejected as a whole.
    pub fn load<A>(dir: &Path, arch: &A) -> Result<Self, PersistErr>
    where
        A: Architecture<Model = M>,
    {
        let paths = [
            MANIFEST_FILE,
            MODEL_FILE,
            ENV_SCALER_FILE,
            WEARABLE_SCALER_FILE,
            TEXT_ENCODER_FILE,
        ]
        .map(|file| dir.join(file));

        if let Some(missing) = paths.iter().find(|path| !path.is_file()) {
            return Err(PersistErr::Missing(missing.clone()));
        }

        let [manifest, weights, env_scaler, wearable_scaler, text_encoder] = paths;
        let manifest: Manifest = read_json(&manifest)?;
        let env_scaler: ScalerSpec = read_json(&env_scaler)?;
        let wearable_scaler: ScalerSpec = read_json(&wearable_scaler)?;
        let text_encoder: EncoderSpec = read_json(&text_encoder)?;

        let bundle = PreprocessorBundle::new(
            StandardScaler::from_spec(env_scaler)?,
            StandardScaler::from_spec(wearable_scaler)?,
            LabelEncoder::from_spec(text_encoder)?,
        );
        bundle.ensure_fitted()?;

        if bundle.fingerprint() != manifest.fingerprint {
            return Err(PersistErr::FingerprintMismatch {
                expected: manifest.fingerprint,
                got: bundle.fingerprint().to_string(),
            });
        }

        let params = decode_weights(&fs::read(&weights)?, &manifest.tensors)?;
        params.ensure_shapes(&arch.shapes())?;

        let mut model = arch.build(0)?;
        model.set_weights(&params)?;

        Ok(Self {
            model,
            bundle,
            manifest,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn bundle(&self) -> &PreprocessorBundle {
        &self.bundle
    }

    pub fn weights(&self) -> ParameterVector {
        self.model.get_weights()
    }

    /// Predicts hospital admissions for every record, the target column is ignored.
    pub fn predict(&mut self, records: &[Record]) -> Result<Vec<f32>, PersistErr> {
        let samples = self.bundle.transform(records)?;
        Ok(self.model.predict(&samples)?)
    }
}

fn tensor_name(index: usize) -> String {
    format!("param_{index:02}")
}

fn encode_weights(params: &ParameterVector, fingerprint: &str) -> Result<Vec<u8>, PersistErr> {
    // safetensors stores little-endian values.
    let buffers: Vec<Vec<u8>> = params
        .tensors()
        .iter()
        .map(|tensor| tensor.data().iter().flat_map(|x| x.to_le_bytes()).collect())
        .collect();

    let mut views = Vec::with_capacity(params.len());

    for (index, (tensor, bytes)) in params.tensors().iter().zip(&buffers).enumerate() {
        let view = TensorView::new(Dtype::F32, tensor.shape().to_vec(), bytes)?;
        views.push((tensor_name(index), view));
    }

    let metadata = Some(HashMap::from([("fingerprint".to_string(), fingerprint.to_string())]));
    Ok(safetensors::serialize(views, &metadata)?)
}

fn decode_weights(bytes: &[u8], entries: &[TensorEntry]) -> Result<ParameterVector, PersistErr> {
    let file = SafeTensors::deserialize(bytes)?;

    let stored = file.names().len();
    if stored != entries.len() {
        return Err(PersistErr::Corrupt(format!(
            "the weights hold {stored} tensors, the manifest lists {}",
            entries.len()
        )));
    }

    let mut tensors = Vec::with_capacity(entries.len());

    for entry in entries {
        let view = file.tensor(&entry.name)?;

        if view.dtype() != Dtype::F32 {
            return Err(PersistErr::Corrupt(format!(
                "tensor {} is {:?}, expected F32",
                entry.name,
                view.dtype()
            )));
        }

        if view.shape() != entry.shape.as_slice() {
            return Err(PersistErr::Corrupt(format!(
                "tensor {} has shape {:?}, the manifest says {:?}",
                entry.name,
                view.shape(),
                entry.shape
            )));
        }

        let data: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        tensors.push(Tensor::new(entry.shape.clone(), data)?);
    }

    Ok(ParameterVector::new(tensors))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistErr> {
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

/// Writes `files` into `dir` as one unit, replacing whatever set was there.
fn write_atomically(dir: &Path, files: &[(&str, Vec<u8>)]) -> Result<(), PersistErr> {
    let name = dir
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "the model directory has no name"))?
        .to_string_lossy()
        .into_owned();

    let parent = match dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let staging = parent.join(format!(".{name}.staging"));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir(&staging)?;

    if let Err(e) = write_files(&staging, files) {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            warn!("failed to remove {}: {cleanup}", staging.display());
        }

        return Err(e.into());
    }

    if !dir.exists() {
        fs::rename(&staging, dir)?;
        return Ok(());
    }

    let retired = parent.join(format!(".{name}.previous"));
    if retired.exists() {
        fs::remove_dir_all(&retired)?;
    }

    fs::rename(dir, &retired)?;

    if let Err(e) = fs::rename(&staging, dir) {
        fs::rename(&retired, dir)?;
        return Err(e.into());
    }

    fs::remove_dir_all(&retired)?;
    Ok(())
}

fn write_files(dir: &Path, files: &[(&str, Vec<u8>)]) -> io::Result<()> {
    for (file, bytes) in files {
        let mut f = File::create(dir.join(file))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_stored_little_endian() {
        let params = ParameterVector::new(vec![Tensor::new(vec![2], vec![1.0, -2.5]).unwrap()]);

        let bytes = encode_weights(&params, "fp").unwrap();
        let file = SafeTensors::deserialize(&bytes).unwrap();
        let view = file.tensor("param_00").unwrap();

        let mut expected = 1.0f32.to_le_bytes().to_vec();
        expected.extend_from_slice(&(-2.5f32).to_le_bytes());
        assert_eq!(view.data(), expected.as_slice());

        let entries = [TensorEntry {
            name: "param_00".into(),
            shape: vec![2],
        }];
        assert_eq!(decode_weights(&bytes, &entries).unwrap(), params);
    }
}

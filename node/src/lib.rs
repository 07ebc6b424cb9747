//! Runs a whole federation on one machine, either as separate processes or in-process.

pub mod launch;
pub mod simulate;

use std::path::Path;

use anyhow::Context;
use log::info;
use machine_learning::arch::{HealthArchitecture, HealthNet};
use server::persistence::ModelArtifacts;

/// Loads the artifact set in `dir`, failing if any part of it is missing or inconsistent.
pub fn verify(dir: &Path) -> anyhow::Result<ModelArtifacts<HealthNet>> {
    let artifacts = ModelArtifacts::load(dir, &HealthArchitecture)
        .with_context(|| format!("invalid artifact set at {}", dir.display()))?;

    let manifest = artifacts.manifest();
    info!(
        rounds = manifest.rounds,
        fingerprint = manifest.fingerprint.as_str();
        "artifact set at {} is valid",
        dir.display()
    );

    Ok(artifacts)
}

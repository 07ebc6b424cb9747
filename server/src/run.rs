use std::{path::PathBuf, sync::Arc};

use log::info;
use machine_learning::{
    ParameterVector,
    arch::{Architecture, HealthArchitecture, Model},
    dataset::read_csv,
    preprocessing::PreprocessorBundle,
};
use tokio::net::TcpListener;

use crate::{
    Result, ServerConfig,
    coordinator::{RoundCoordinator, TrainingHistory},
    persistence::PersistenceWriter,
    registry::{ClientRegistry, accept_clients},
};

/// The result of a successful run, already persisted.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub params: ParameterVector,
    pub history: TrainingHistory,
    pub model_dir: PathBuf,
}

/// Runs a whole federation on `listener`.
///
/// Fits the preprocessors once over the full dataset, waits for the clients, runs every
/// round and saves the final model with those same preprocessors.
///
/// # Errors
/// Any `CoordinatorErr`, nothing is saved unless every round succeeded.
pub async fn run_server(config: &ServerConfig, listener: TcpListener) -> Result<RunOutcome> {
    config.validate()?;

    let records = read_csv(&config.data)?;
    let bundle = Arc::new(PreprocessorBundle::fit(&records)?);
    info!(records = records.len(), fingerprint = bundle.fingerprint(); "fitted the preprocessors");

    let arch = HealthArchitecture;
    let initial = arch.build(config.seed)?.get_weights();

    let mut registry = ClientRegistry::new(&config.roster);
    let clients = accept_clients(
        &listener,
        &mut registry,
        &bundle.spec(),
        config.min_clients,
        config.join_timeout,
    )
    .await?;

    let coordinator = RoundCoordinator::new(config.round_config(bundle.fingerprint()), clients)?;
    let mut writer = PersistenceWriter::new(&config.model_dir, arch, Arc::clone(&bundle));
    let (params, history) = coordinator.run(initial, &mut writer).await?;

    Ok(RunOutcome {
        params,
        history,
        model_dir: config.model_dir.clone(),
    })
}

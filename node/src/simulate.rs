//! The whole federation as tasks of one process, every client over its own duplex channel.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Args;
use client::run_session;
use log::{info, warn};
use machine_learning::{
    arch::{Architecture, HealthArchitecture, Model},
    dataset::{DEFAULT_DATA_PATH, MemorySource, read_csv},
    preprocessing::PreprocessorBundle,
};
use server::{
    RunOutcome, ServerConfig,
    coordinator::RoundCoordinator,
    persistence::PersistenceWriter,
    registry::{ClientRegistry, handshake},
};
use tokio::{io, task::JoinSet, time::Duration};

/// Bytes buffered by each in-memory channel.
const CHANNEL_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    #[arg(long, default_value_t = 3)]
    pub rounds: usize,

    #[arg(long, env = "DATA_FILE_PATH", default_value = DEFAULT_DATA_PATH)]
    pub data: PathBuf,

    #[arg(long, env = "MODEL_DIR", default_value = "model")]
    pub model_dir: PathBuf,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 600)]
    pub round_timeout_secs: u64,
}

/// Runs every round with the server and the four clients in this process.
///
/// # Returns
/// The outcome of the run, whose model has already been saved and verified.
pub async fn run(args: SimulateArgs) -> anyhow::Result<RunOutcome> {
    let mut config = ServerConfig {
        rounds: args.rounds,
        data: args.data,
        model_dir: args.model_dir,
        seed: args.seed,
        round_timeout: Duration::from_secs(args.round_timeout_secs),
        ..ServerConfig::default()
    };
    config.fit.seed = args.seed;
    config.validate()?;

    let records = read_csv(&config.data)
        .with_context(|| format!("failed to read the dataset at {}", config.data.display()))?;
    let bundle = Arc::new(PreprocessorBundle::fit(&records)?);
    info!(records = records.len(), fingerprint = bundle.fingerprint(); "fitted the preprocessors");

    let source = MemorySource::new(records);
    let spec = bundle.spec();
    let mut registry = ClientRegistry::new(&config.roster);
    let mut sessions = JoinSet::new();
    let mut clients = Vec::with_capacity(config.roster.len());

    for &city in &config.roster {
        let (server_stream, client_stream) = io::duplex(CHANNEL_CAPACITY);

        let (rx, tx) = io::split(client_stream);
        let (rx, tx) = comms::channel(rx, tx);
        let source = source.clone();
        sessions.spawn(async move {
            let res = run_session(city, HealthArchitecture, source, rx, tx).await;
            (city, res)
        });

        let (rx, tx) = io::split(server_stream);
        let (rx, tx) = comms::channel(rx, tx);
        if let Some(client) = handshake(&mut registry, &spec, rx, tx).await? {
            clients.push(client);
        }
    }

    let initial = HealthArchitecture.build(config.seed)?.get_weights();
    let coordinator = RoundCoordinator::new(config.round_config(bundle.fingerprint()), clients)?;
    let mut writer = PersistenceWriter::new(&config.model_dir, HealthArchitecture, Arc::clone(&bundle));
    let (params, history) = coordinator.run(initial, &mut writer).await?;

    while let Some(joined) = sessions.join_next().await {
        let (city, res) = joined?;

        match res {
            Ok(summary) => info!(
                city = city.as_str(),
                trained = summary.rounds_trained,
                failed = summary.rounds_failed;
                "client finished"
            ),
            Err(e) => warn!(city = city.as_str(); "client failed: {e}"),
        }
    }

    if let Some(evaluation) = history.rounds.last().and_then(|r| r.evaluation.as_ref()) {
        info!(loss = evaluation.loss, samples = evaluation.sample_count; "final federated evaluation");
    }

    crate::verify(&config.model_dir)?;

    Ok(RunOutcome {
        params,
        history,
        model_dir: config.model_dir,
    })
}

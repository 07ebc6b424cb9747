use std::{io, path::PathBuf};

use clap::Parser;
use comms::specs::training::FitSpec;
use log::{error, info};
use machine_learning::{City, dataset::DEFAULT_DATA_PATH};
use server::{ServerConfig, run_server};
use tokio::{net::TcpListener, signal, time::Duration};

/// Federated averaging server for health risk prediction.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "SERVER_PORT", default_value_t = 9090)]
    port: u16,

    /// Amount of federated rounds.
    #[arg(long, env = "NUM_ROUNDS", default_value_t = 3)]
    rounds: usize,

    /// Clients that must join, and succeed every round, for the run to go on.
    #[arg(long, env = "MIN_CLIENTS", default_value_t = City::ALL.len())]
    min_clients: usize,

    /// The CSV dataset the preprocessors are fitted on.
    #[arg(long, env = "DATA_FILE_PATH", default_value = DEFAULT_DATA_PATH)]
    data: PathBuf,

    /// Where the final artifact set is written.
    #[arg(long, env = "MODEL_DIR", default_value = "model")]
    model_dir: PathBuf,

    #[arg(long, default_value_t = 600)]
    round_timeout_secs: u64,

    #[arg(long, default_value_t = 300)]
    join_timeout_secs: u64,

    #[arg(long, default_value_t = 1)]
    local_epochs: usize,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Seed of the initial parameters and of every client's shuffling.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            rounds: self.rounds,
            min_clients: self.min_clients,
            data: self.data,
            model_dir: self.model_dir,
            round_timeout: Duration::from_secs(self.round_timeout_secs),
            join_timeout: Duration::from_secs(self.join_timeout_secs),
            fit: FitSpec {
                local_epochs: self.local_epochs,
                batch_size: self.batch_size,
                seed: self.seed,
                ..FitSpec::default()
            },
            seed: self.seed,
            roster: City::ALL.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();
    let config = Args::parse().into_config();
    config.validate()?;

    if !config.data.exists() {
        error!("data file not found at {}", config.data.display());
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("data file not found at {}", config.data.display()),
        ));
    }

    let listener = TcpListener::bind(config.addr()).await?;
    info!(
        rounds = config.rounds,
        min_clients = config.min_clients;
        "listening on {}",
        config.addr()
    );

    let run = async { io::Result::Ok(run_server(&config, listener).await?) };
    let outcome = comms::until_interrupted(run, signal::ctrl_c())
        .await
        .inspect_err(|e| error!("run abandoned, nothing was saved: {e}"))?;

    info!(rounds = outcome.history.rounds.len(); "model saved to {}", outcome.model_dir.display());
    Ok(())
}

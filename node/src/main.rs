use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::warn;
use node::{
    launch::{self, LaunchArgs},
    simulate::{self, SimulateArgs},
};
use tokio::signal;

/// Local launcher for the federated health risk training.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Spawns the server and one client process per city.
    Launch(LaunchArgs),
    /// Runs the server and every client as tasks of this process.
    Simulate(SimulateArgs),
    /// Checks that an artifact set loads as a whole.
    Verify {
        #[arg(long, env = "MODEL_DIR", default_value = "model")]
        model_dir: PathBuf,
    },
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Launch(args) => launch::run(args).await,
        Command::Simulate(args) => simulate::run(args).await.map(|_| ()),
        Command::Verify { model_dir } => node::verify(&model_dir).map(|_| ()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let res = comms::until_interrupted(run(cli.command), signal::ctrl_c()).await;
    if res.is_err() {
        warn!("run abandoned, every spawned process was terminated");
    }

    res
}

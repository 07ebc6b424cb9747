//! Process supervision: one server process plus one client process per city.

use std::{
    env,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use anyhow::{Context, bail};
use clap::Args;
use log::{info, warn};
use machine_learning::{City, dataset::DEFAULT_DATA_PATH};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    time::{self, Duration},
};

#[derive(Debug, Clone, Args)]
pub struct LaunchArgs {
    #[arg(long, default_value_t = 9090)]
    pub port: u16,

    #[arg(long, default_value_t = 3)]
    pub rounds: usize,

    #[arg(long, env = "DATA_FILE_PATH", default_value = DEFAULT_DATA_PATH)]
    pub data: PathBuf,

    #[arg(long, env = "MODEL_DIR", default_value = "model")]
    pub model_dir: PathBuf,

    /// Directory holding the `server` and `client` binaries, defaults to this binary's.
    #[arg(long)]
    pub bin_dir: Option<PathBuf>,

    /// Time the server gets to bind before the clients start.
    #[arg(long, default_value_t = 3)]
    pub startup_delay_secs: u64,
}

/// A spawned process whose output is forwarded with a label.
struct Supervised {
    label: String,
    child: Child,
}

impl Supervised {
    fn spawn(label: &str, program: &Path, args: &[String]) -> anyhow::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {label} from {}", program.display()))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward(label.to_string(), stdout));
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward(label.to_string(), stderr));
        }

        info!(process = label; "started");
        Ok(Self {
            label: label.to_string(),
            child,
        })
    }

    async fn wait(&mut self) -> anyhow::Result<ExitStatus> {
        let status = self.child.wait().await?;
        info!(process = self.label.as_str(); "exited with {status}");
        Ok(status)
    }
}

async fn forward<R: AsyncRead + Unpin>(label: String, output: R) {
    let mut lines = BufReader::new(output).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        println!("[{label}] {line}");
    }
}

fn binary(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{}", env::consts::EXE_SUFFIX))
}

/// Starts the server, then every client, waits for all of them and verifies the saved model.
///
/// Dropping the returned future kills every process still running.
pub async fn run(args: LaunchArgs) -> anyhow::Result<()> {
    let bin_dir = match args.bin_dir.clone() {
        Some(dir) => dir,
        None => env::current_exe()?
            .parent()
            .map(Path::to_path_buf)
            .context("the launcher binary has no parent directory")?,
    };

    let data = args.data.to_string_lossy().into_owned();

    let server_args = vec![
        "--port".to_string(),
        args.port.to_string(),
        "--rounds".to_string(),
        args.rounds.to_string(),
        "--min-clients".to_string(),
        City::ALL.len().to_string(),
        "--data".to_string(),
        data.clone(),
        "--model-dir".to_string(),
        args.model_dir.to_string_lossy().into_owned(),
    ];
    let mut server = Supervised::spawn("server", &binary(&bin_dir, "server"), &server_args)?;

    time::sleep(Duration::from_secs(args.startup_delay_secs)).await;

    let mut clients = Vec::with_capacity(City::ALL.len());
    for city in City::ALL {
        let client_args = vec![
            "--city".to_string(),
            city.as_str().to_string(),
            "--server".to_string(),
            format!("localhost:{}", args.port),
            "--data".to_string(),
            data.clone(),
        ];

        clients.push(Supervised::spawn(city.as_str(), &binary(&bin_dir, "client"), &client_args)?);
    }

    let status = server.wait().await?;
    if !status.success() {
        bail!("the server failed with {status}, no model was saved");
    }

    for client in &mut clients {
        let status = client.wait().await?;
        if !status.success() {
            warn!(process = client.label.as_str(); "client failed with {status}");
        }
    }

    crate::verify(&args.model_dir)?;
    info!("training complete, model saved to {}", args.model_dir.display());
    Ok(())
}

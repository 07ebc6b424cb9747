use std::{io, path::PathBuf, time::Duration};

use clap::Parser;
use log::{error, info, warn};
use machine_learning::{
    City,
    arch::HealthArchitecture,
    dataset::{CsvSource, DEFAULT_DATA_PATH},
};
use tokio::{net::TcpStream, signal, time};

const CONNECT_ATTEMPTS: usize = 30;
const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Federated learning client for health risk prediction.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// City name for this client: Delhi, Beijing, Mexico City or Los Angeles.
    #[arg(long, env = "CLIENT_CITY")]
    city: City,

    /// Server address in `host:port` form.
    #[arg(long, env = "SERVER_ADDR", default_value = "localhost:9090")]
    server: String,

    /// The CSV dataset holding this client's partition.
    #[arg(long, env = "DATA_FILE_PATH", default_value = DEFAULT_DATA_PATH)]
    data: PathBuf,
}

async fn connect(addr: &str) -> io::Result<TcpStream> {
    let mut attempt = 1;

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(attempt = attempt; "server at {addr} not reachable yet: {e}");
                attempt += 1;
                time::sleep(CONNECT_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if !args.data.exists() {
        error!("data file not found at {}", args.data.display());
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("data file not found at {}", args.data.display()),
        ));
    }

    info!(city = args.city.as_str(); "connecting to server at {}", args.server);
    let stream = connect(&args.server).await?;
    let (rx, tx) = stream.into_split();
    let (rx, tx) = comms::channel(rx, tx);

    let source = CsvSource::new(args.data);

    let session = async {
        let summary = client::run_session(args.city, HealthArchitecture, source, rx, tx).await?;
        io::Result::Ok(summary)
    };
    let summary = comms::until_interrupted(session, signal::ctrl_c()).await?;

    info!(
        city = args.city.as_str(),
        trained = summary.rounds_trained,
        failed = summary.rounds_failed;
        "client finished"
    );
    Ok(())
}

use std::{error::Error, fmt, io, path::PathBuf};

use machine_learning::MlErr;
use safetensors::SafeTensorError;

/// The coordinator's result type.
pub type Result<T> = std::result::Result<T, CoordinatorErr>;

/// Failures of the weighted averaging.
#[derive(Debug)]
pub enum AggregationErr {
    InsufficientUpdates,
    ZeroWeight { index: usize },
    ShapeMismatch { index: usize, source: MlErr },
}

impl fmt::Display for AggregationErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationErr::InsufficientUpdates => write!(f, "there are no updates to aggregate"),
            AggregationErr::ZeroWeight { index } => write!(f, "update {index} has a zero weight"),
            AggregationErr::ShapeMismatch { index, source } => {
                write!(f, "update {index} disagrees with the first update: {source}")
            }
        }
    }
}

impl Error for AggregationErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AggregationErr::ShapeMismatch { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failures of a single client call, they never end the run by themselves.
#[derive(Debug)]
pub enum ProxyErr {
    /// The client answered with an error frame, the channel is still usable.
    Reported(String),
    /// The client didn't answer within the round timeout.
    Timeout,
    /// The client broke the protocol, answering out of order or with malformed data.
    Protocol(String),
    /// The client answered but its update violates the run's contract.
    Contract(String),
    Io(io::Error),
}

impl ProxyErr {
    /// Whether the channel to the client can still be trusted for further requests.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProxyErr::Reported(_))
    }
}

impl fmt::Display for ProxyErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyErr::Reported(reason) => write!(f, "client reported: {reason}"),
            ProxyErr::Timeout => write!(f, "client timed out"),
            ProxyErr::Protocol(reason) => write!(f, "protocol violation: {reason}"),
            ProxyErr::Contract(reason) => write!(f, "contract violation: {reason}"),
            ProxyErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ProxyErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProxyErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProxyErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Failures while writing or loading the artifact set.
#[derive(Debug)]
pub enum PersistErr {
    Io(io::Error),
    Json(serde_json::Error),
    SafeTensors(SafeTensorError),
    Ml(MlErr),
    Missing(PathBuf),
    Corrupt(String),
    FingerprintMismatch { expected: String, got: String },
}

impl fmt::Display for PersistErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistErr::Io(e) => write!(f, "io error: {e}"),
            PersistErr::Json(e) => write!(f, "json error: {e}"),
            PersistErr::SafeTensors(e) => write!(f, "safetensors error: {e}"),
            PersistErr::Ml(e) => write!(f, "{e}"),
            PersistErr::Missing(path) => {
                write!(f, "artifact {} is missing, the set is unusable", path.display())
            }
            PersistErr::Corrupt(reason) => write!(f, "corrupt artifact set: {reason}"),
            PersistErr::FingerprintMismatch { expected, got } => write!(
                f,
                "preprocessor fingerprint {got} doesn't match the expected {expected}"
            ),
        }
    }
}

impl Error for PersistErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PersistErr::Io(e) => Some(e),
            PersistErr::Json(e) => Some(e),
            PersistErr::SafeTensors(e) => Some(e),
            PersistErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PersistErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for PersistErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<SafeTensorError> for PersistErr {
    fn from(value: SafeTensorError) -> Self {
        Self::SafeTensors(value)
    }
}

impl From<MlErr> for PersistErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

/// Failures that end a run.
#[derive(Debug)]
pub enum CoordinatorErr {
    Config(String),
    ClientShortfall {
        joined: usize,
        required: usize,
    },
    Quorum {
        round: usize,
        succeeded: usize,
        required: usize,
    },
    ContractViolation {
        client: String,
        round: usize,
        reason: String,
    },
    Aggregation(AggregationErr),
    Persist(PersistErr),
    Ml(MlErr),
    Io(io::Error),
}

impl fmt::Display for CoordinatorErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorErr::Config(reason) => write!(f, "invalid configuration: {reason}"),
            CoordinatorErr::ClientShortfall { joined, required } => write!(
                f,
                "only {joined} of the required {required} clients joined before the deadline"
            ),
            CoordinatorErr::Quorum {
                round,
                succeeded,
                required,
            } => write!(
                f,
                "round {round} failed: {succeeded} successful updates, {required} required"
            ),
            CoordinatorErr::ContractViolation {
                client,
                round,
                reason,
            } => write!(f, "client {client} violated the contract at round {round}: {reason}"),
            CoordinatorErr::Aggregation(e) => write!(f, "aggregation failed: {e}"),
            CoordinatorErr::Persist(e) => write!(f, "persistence failed: {e}"),
            CoordinatorErr::Ml(e) => write!(f, "{e}"),
            CoordinatorErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for CoordinatorErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CoordinatorErr::Aggregation(e) => Some(e),
            CoordinatorErr::Persist(e) => Some(e),
            CoordinatorErr::Ml(e) => Some(e),
            CoordinatorErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CoordinatorErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for CoordinatorErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<AggregationErr> for CoordinatorErr {
    fn from(value: AggregationErr) -> Self {
        Self::Aggregation(value)
    }
}

impl From<PersistErr> for CoordinatorErr {
    fn from(value: PersistErr) -> Self {
        Self::Persist(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<CoordinatorErr> for io::Error {
    fn from(value: CoordinatorErr) -> Self {
        match value {
            CoordinatorErr::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

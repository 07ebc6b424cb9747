use std::{error::Error, fmt, io};

use machine_learning::MlErr;
use tokio::task::JoinError;

/// The client module's result type.
pub type Result<T> = std::result::Result<T, ClientErr>;

/// Client runtime failures.
#[derive(Debug)]
pub enum ClientErr {
    Io(io::Error),
    Ml(MlErr),
    UnexpectedMessage { round: usize, got: &'static str },
    Rejected(String),
    Finished,
    Task(JoinError),
}

impl fmt::Display for ClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientErr::Io(e) => write!(f, "io error: {e}"),
            ClientErr::Ml(e) => write!(f, "{e}"),
            ClientErr::UnexpectedMessage { round, got } => {
                write!(f, "unexpected message at round {round}: got {got}")
            }
            ClientErr::Rejected(reason) => write!(f, "the server rejected the client: {reason}"),
            ClientErr::Finished => write!(f, "the trainer already finished"),
            ClientErr::Task(e) => write!(f, "training task failed: {e}"),
        }
    }
}

impl Error for ClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientErr::Io(e) => Some(e),
            ClientErr::Ml(e) => Some(e),
            ClientErr::Task(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for ClientErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<JoinError> for ClientErr {
    fn from(value: JoinError) -> Self {
        Self::Task(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ClientErr> for io::Error {
    fn from(value: ClientErr) -> Self {
        match value {
            ClientErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        index: usize,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    TensorCount {
        got: usize,
        expected: usize,
    },
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    InvalidConfig(String),
    MissingColumn(String),
    InvalidCell {
        line: usize,
        column: String,
        value: String,
    },
    UnknownLabel {
        feature: String,
        label: String,
    },
    UnknownCity(String),
    NoDataForClient(String),
    EmptySplit(&'static str),
    EmptyDataset,
    PreprocessorNotInitialized(&'static str),
    Io(io::Error),
    Json(serde_json::Error),
    Csv(::csv::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in the {what}, got {got} and expected {expected}"
            ),
            MlErr::ShapeMismatch {
                index,
                got,
                expected,
            } => write!(
                f,
                "Tensor {index} has shape {got:?} but the architecture expects {expected:?}"
            ),
            MlErr::TensorCount { got, expected } => {
                write!(f, "Got {got} tensors but the architecture has {expected}")
            }
            MlErr::IndexOutOfRange { what, index, len } => {
                write!(f, "The {what} index {index} is out of range for length {len}")
            }
            MlErr::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
            MlErr::MissingColumn(col) => write!(f, "The dataset has no `{col}` column"),
            MlErr::InvalidCell {
                line,
                column,
                value,
            } => write!(f, "Line {line}: cannot parse `{value}` in column `{column}`"),
            MlErr::UnknownLabel { feature, label } => {
                write!(f, "Unknown label `{label}` for feature `{feature}`")
            }
            MlErr::UnknownCity(city) => write!(f, "Unknown client identity `{city}`"),
            MlErr::NoDataForClient(city) => write!(f, "No data found for client {city}"),
            MlErr::EmptySplit(which) => write!(f, "The {which} split has no samples"),
            MlErr::EmptyDataset => write!(f, "Cannot fit a preprocessor on an empty dataset"),
            MlErr::PreprocessorNotInitialized(which) => {
                write!(f, "The {which} preprocessor is not fitted")
            }
            MlErr::Io(e) => write!(f, "io error: {e}"),
            MlErr::Json(e) => write!(f, "json error: {e}"),
            MlErr::Csv(e) => write!(f, "csv error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            MlErr::Json(e) => Some(e),
            MlErr::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<::csv::Error> for MlErr {
    fn from(value: ::csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<MlErr> for io::Error {
    fn from(value: MlErr) -> Self {
        match value {
            MlErr::Io(e) => e,
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

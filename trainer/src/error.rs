use std::{error::Error, fmt, io};

use machine_learning::MlErr;
use records::RecordErr;

/// The trainer's result type.
pub type Result<T> = std::result::Result<T, TrainerErr>;

/// Trainer runtime failures.
#[derive(Debug)]
pub enum TrainerErr {
    Io(io::Error),
    Record(RecordErr),
    Ml(MlErr),
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
    Join(String),
}

impl fmt::Display for TrainerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainerErr::Io(e) => write!(f, "io error: {e}"),
            TrainerErr::Record(e) => write!(f, "dataset error: {e}"),
            TrainerErr::Ml(e) => write!(f, "model error: {e}"),
            TrainerErr::InvalidConfig { key, value, reason } => {
                write!(f, "invalid value {value:?} for {key}: {reason}")
            }
            TrainerErr::Join(e) => write!(f, "task join error: {e}"),
        }
    }
}

impl Error for TrainerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainerErr::Io(e) => Some(e),
            TrainerErr::Record(e) => Some(e),
            TrainerErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<RecordErr> for TrainerErr {
    fn from(value: RecordErr) -> Self {
        match value {
            RecordErr::Io(e) => Self::Io(e),
            other => Self::Record(other),
        }
    }
}

impl From<MlErr> for TrainerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<tokio::task::JoinError> for TrainerErr {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Join(value.to_string())
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TrainerErr> for io::Error {
    fn from(value: TrainerErr) -> Self {
        match value {
            TrainerErr::Io(e) => e,
            TrainerErr::InvalidConfig { .. } => io::Error::new(io::ErrorKind::InvalidInput, value),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

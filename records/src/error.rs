use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used across the records crate.
pub type Result<T> = std::result::Result<T, RecordErr>;

/// Failures while reading record files or decoding the examples they hold.
#[derive(Debug)]
pub enum RecordErr {
    Io(io::Error),
    Truncated {
        offset: u64,
    },
    Corrupted {
        offset: u64,
        what: &'static str,
    },
    Decode(prost::DecodeError),
    MissingFeatureList(String),
    FeatureType {
        key: String,
        step: usize,
    },
    FeatureShape {
        key: String,
        step: usize,
        got: usize,
        expected: usize,
    },
}

impl Display for RecordErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordErr::Io(e) => write!(f, "io error: {e}"),
            RecordErr::Truncated { offset } => {
                write!(f, "record starting at byte {offset} is truncated")
            }
            RecordErr::Corrupted { offset, what } => {
                write!(f, "checksum mismatch on the {what} of the record at byte {offset}")
            }
            RecordErr::Decode(e) => write!(f, "failed to decode sequence example: {e}"),
            RecordErr::MissingFeatureList(key) => {
                write!(f, "feature list {key:?} is missing from the sequence example")
            }
            RecordErr::FeatureType { key, step } => {
                write!(f, "feature list {key:?} has a value of the wrong type at step {step}")
            }
            RecordErr::FeatureShape {
                key,
                step,
                got,
                expected,
            } => write!(
                f,
                "feature list {key:?} has {got} values at step {step}, expected {expected}"
            ),
        }
    }
}

impl Error for RecordErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RecordErr::Io(e) => Some(e),
            RecordErr::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RecordErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<prost::DecodeError> for RecordErr {
    fn from(value: prost::DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<RecordErr> for io::Error {
    fn from(value: RecordErr) -> Self {
        match value {
            RecordErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

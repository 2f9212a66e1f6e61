use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;
use rand_distr::NormalError;

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
    Shape(ShapeError),
    MissingForward,
    LabelOutOfRange {
        label: usize,
        classes: usize,
    },
    ParamGenExhausted {
        got: usize,
        expected: usize,
    },
    Distribution(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "size mismatch on {what}, got {got} and expected {expected}"),
            MlErr::Shape(e) => write!(f, "invalid array shape: {e}"),
            MlErr::MissingForward => {
                write!(f, "tried to run a backward pass without a preceding forward pass")
            }
            MlErr::LabelOutOfRange { label, classes } => {
                write!(f, "label {label} is out of range for {classes} classes")
            }
            MlErr::ParamGenExhausted { got, expected } => write!(
                f,
                "the parameter generator ran out after {got} of the {expected} requested values"
            ),
            MlErr::Distribution(msg) => write!(f, "invalid distribution: {msg}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<NormalError> for MlErr {
    fn from(value: NormalError) -> Self {
        Self::Distribution(value.to_string())
    }
}

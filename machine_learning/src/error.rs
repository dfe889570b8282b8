use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;
use safetensors::SafeTensorError;

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
    BackwardBeforeForward {
        layer: &'static str,
    },
    InvalidArch(String),
    UnknownArch(String),
    UnknownOptimizer(String),
    NonFinite {
        what: &'static str,
    },
    InvalidTensor(String),
    Tensor(SafeTensorError),
    Io(io::Error),
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
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(e) => write!(f, "Invalid tensor shape: {e}"),
            MlErr::BackwardBeforeForward { layer } => write!(
                f,
                "Tried to run the backward pass of a {layer} layer without a training forward pass"
            ),
            MlErr::InvalidArch(detail) => write!(f, "Invalid architecture: {detail}"),
            MlErr::UnknownArch(name) => write!(f, "Unknown architecture name {name:?}"),
            MlErr::UnknownOptimizer(name) => write!(f, "Unknown optimizer name {name:?}"),
            MlErr::NonFinite { what } => write!(f, "The {what} is not a finite number"),
            MlErr::InvalidTensor(detail) => write!(f, "Invalid tensor file: {detail}"),
            MlErr::Tensor(e) => write!(f, "Tensor serialization failed: {e}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            MlErr::Tensor(e) => Some(e),
            MlErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<SafeTensorError> for MlErr {
    fn from(value: SafeTensorError) -> Self {
        Self::Tensor(value)
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

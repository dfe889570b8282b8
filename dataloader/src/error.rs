use std::{
    error::Error,
    fmt, io,
    path::PathBuf,
};

use comms::CommsErr;
use machine_learning::MlErr;
use ndarray::ShapeError;

/// The data loading module's result type.
pub type Result<T> = std::result::Result<T, LoaderErr>;

/// Data loading failures. None of them is retried.
#[derive(Debug)]
pub enum LoaderErr {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    /// A dataset list row that can't be turned into a sample, `line` is 1-based.
    Row {
        line: u64,
        detail: String,
    },
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    ImageSize {
        path: PathBuf,
        got: (usize, usize, usize),
        expected: (usize, usize, usize),
    },
    Empty {
        what: &'static str,
    },
    Config(String),
    Shape(ShapeError),
    Tensor(MlErr),
    Comms(CommsErr),
    Pool(rayon::ThreadPoolBuildError),
    /// A decode job was dropped before producing its image.
    JobLost,
}

impl fmt::Display for LoaderErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderErr::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            LoaderErr::Csv { path, source } => {
                write!(f, "couldn't read the list {}: {source}", path.display())
            }
            LoaderErr::Row { line, detail } => {
                write!(f, "invalid dataset row at line {line}: {detail}")
            }
            LoaderErr::Decode { path, source } => {
                write!(f, "couldn't decode image {}: {source}", path.display())
            }
            LoaderErr::ImageSize {
                path,
                got,
                expected,
            } => write!(
                f,
                "image {} has shape {got:?}, expected {expected:?}",
                path.display()
            ),
            LoaderErr::Empty { what } => write!(f, "the {what} is empty"),
            LoaderErr::Config(detail) => write!(f, "invalid loader configuration: {detail}"),
            LoaderErr::Shape(e) => write!(f, "couldn't assemble a batch: {e}"),
            LoaderErr::Tensor(e) => write!(f, "tensor file error: {e}"),
            LoaderErr::Comms(e) => write!(f, "{e}"),
            LoaderErr::Pool(e) => write!(f, "couldn't start the loader pool: {e}"),
            LoaderErr::JobLost => write!(f, "a decode job ended without a result"),
        }
    }
}

impl Error for LoaderErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoaderErr::Io { source, .. } => Some(source),
            LoaderErr::Csv { source, .. } => Some(source),
            LoaderErr::Decode { source, .. } => Some(source),
            LoaderErr::Shape(e) => Some(e),
            LoaderErr::Tensor(e) => Some(e),
            LoaderErr::Comms(e) => Some(e),
            LoaderErr::Pool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for LoaderErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<MlErr> for LoaderErr {
    fn from(value: MlErr) -> Self {
        Self::Tensor(value)
    }
}

impl From<CommsErr> for LoaderErr {
    fn from(value: CommsErr) -> Self {
        Self::Comms(value)
    }
}

impl From<rayon::ThreadPoolBuildError> for LoaderErr {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        Self::Pool(value)
    }
}

use std::{fmt, io};

use comms::CommsErr;
use dataloader::LoaderErr;
use machine_learning::MlErr;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// All errors that can occur while running a training session.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before any stage starts.
    InvalidConfig(String),
    /// The model, its training or its checkpoints failed.
    Ml(MlErr),
    /// Reading the datasets, the mean or the images failed.
    Loader(LoaderErr),
    /// A queue between two stages broke.
    Comms(CommsErr),
    /// A stage panicked or its task was aborted.
    Join(String),
    /// A metrics record couldn't be written.
    Json(serde_json::Error),
    /// More validation results arrived than the validation set holds.
    ValidationOverrun { processed: usize, size: usize },
    Io(io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Ml(e) => write!(f, "training failed: {e}"),
            Self::Loader(e) => write!(f, "data loading failed: {e}"),
            Self::Comms(e) => write!(f, "pipeline broke: {e}"),
            Self::Join(msg) => write!(f, "a pipeline stage crashed: {msg}"),
            Self::Json(e) => write!(f, "couldn't write a metrics record: {e}"),
            Self::ValidationOverrun { processed, size } => write!(
                f,
                "{processed} validation samples processed but the validation set has {size}"
            ),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ml(e) => Some(e),
            Self::Loader(e) => Some(e),
            Self::Comms(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MlErr> for OrchestratorError {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<LoaderErr> for OrchestratorError {
    fn from(e: LoaderErr) -> Self {
        Self::Loader(e)
    }
}

impl From<CommsErr> for OrchestratorError {
    fn from(e: CommsErr) -> Self {
        Self::Comms(e)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<tokio::task::JoinError> for OrchestratorError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e.to_string())
    }
}

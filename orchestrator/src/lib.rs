pub mod configs;
pub mod engine;
pub mod error;
pub mod logger;
mod session;

use log::info;

use configs::TrainingConfig;

pub use error::{OrchestratorError, Result};
pub use session::{Session, TrainingSummary};

/// Trains a model from start to end, blocking until it's done.
///
/// # Errors
/// Returns an `OrchestratorError` if the configuration is invalid or any stage of the
/// pipeline fails.
pub fn train(config: TrainingConfig) -> Result<TrainingSummary> {
    info!(arch = config.arch.as_str(), epochs = config.epochs; "preparing session");
    Session::new(config)?.run()
}

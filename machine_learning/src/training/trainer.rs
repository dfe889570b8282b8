use std::path::Path;

use comms::Report;
use ndarray::{ArrayView2, ArrayView4};

use crate::{Result, checkpoint::Checkpoint};

/// Owns a model and its parameters and trains it one batch at a time.
pub trait Trainer: Send {
    /// Runs one training step: forward, loss, backward and a single optimizer update.
    ///
    /// # Arguments
    /// * `x` - The batch images.
    /// * `y` - The batch labels.
    ///
    /// # Returns
    /// The loss and accuracy of the forward pass, computed before the update.
    fn train_batch(&mut self, x: ArrayView4<f32>, y: ArrayView2<f32>) -> Result<Report>;

    /// Runs a forward pass only, leaving the parameters untouched.
    fn evaluate(&mut self, x: ArrayView4<f32>, y: ArrayView2<f32>) -> Result<Report>;

    /// Returns the amount of optimizer updates made so far.
    fn steps(&self) -> usize;

    /// Returns the current parameters.
    fn params(&self) -> &[f32];

    /// Replaces the parameters with the ones of a previous run.
    ///
    /// # Errors
    /// If the checkpoint was taken from a different network.
    fn restore(&mut self, checkpoint: Checkpoint) -> Result<()>;

    /// Writes the current parameters to `path`.
    fn save(&self, path: &Path) -> Result<()>;
}

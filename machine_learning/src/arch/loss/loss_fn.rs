use ndarray::{Array2, ArrayView2};

/// Measures how far a model's output is from the expected one.
pub trait LossFn: Send {
    /// Returns the loss of a batch of predictions.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// Returns the derivative of `loss` with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}

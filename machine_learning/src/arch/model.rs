use ndarray::{ArrayD, ArrayViewD};

use crate::error::Result;

/// A differentiable model whose learnable parameters live outside of it, in a flat slice.
pub trait Model: Send {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input batch, samples along the first axis.
    /// * `train` - Whether to keep the intermediate values needed by `backward`.
    ///
    /// # Returns
    /// The model's output for `x`.
    fn forward(&mut self, params: &[f32], x: ArrayViewD<f32>, train: bool) -> Result<ArrayD<f32>>;

    /// Propagates the loss derivative backwards, writing the parameters' gradient.
    ///
    /// Must follow a `forward` call made with `train` set.
    ///
    /// # Arguments
    /// * `params` - The model's parameters, the same used in the last forward pass.
    /// * `grad` - A buffer for writing the gradient, as long as `params`.
    /// * `d` - The derivative of the loss with respect to the model's output.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: ArrayD<f32>) -> Result<()>;
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn forward(&mut self, params: &[f32], x: ArrayViewD<f32>, train: bool) -> Result<ArrayD<f32>> {
        (**self).forward(params, x, train)
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: ArrayD<f32>) -> Result<()> {
        (**self).backward(params, grad, d)
    }
}

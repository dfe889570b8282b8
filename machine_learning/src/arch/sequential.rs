use ndarray::{ArrayD, ArrayViewD};

use super::{Model, layers::Layer};
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// Each layer owns a contiguous region of the flat parameter slice, in layer order.
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Returns the layers of this model.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    fn forward(&mut self, params: &[f32], x: ArrayViewD<f32>, train: bool) -> Result<ArrayD<f32>> {
        self.check_len("params", params.len())?;

        let mut offset = 0;
        let mut out: Option<ArrayD<f32>> = None;

        for layer in self.layers.iter_mut() {
            let size = layer.size();
            let layer_params = &params[offset..offset + size];
            offset += size;

            let input = match &out {
                Some(a) => a.view(),
                None => x.view(),
            };

            let next = layer.forward(layer_params, input, train)?;
            out = Some(next);
        }

        out.ok_or_else(|| MlErr::InvalidArch("the model has no layers".into()))
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: ArrayD<f32>) -> Result<()> {
        self.check_len("params", params.len())?;
        self.check_len("grad", grad.len())?;

        let mut end = params.len();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }
}

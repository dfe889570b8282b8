use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::{
    Sequential,
    layers::{Conv2d, Layer, MaxPool2d},
};
use crate::{MlErr, Result};

/// The shape of the activations flowing between layers, without the batch axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    Maps { c: usize, h: usize, w: usize },
    Flat(usize),
}

/// Builds `Sequential` models, inferring every layer's input size from the previous one and
/// initializing its parameters.
///
/// Weights are drawn from `N(0, 2 / fan_in)`, biases start at zero.
pub struct SequentialBuilder<'r, R: Rng> {
    shape: Shape,
    layers: Vec<Layer>,
    params: Vec<f32>,
    rng: &'r mut R,
}

impl<'r, R: Rng> SequentialBuilder<'r, R> {
    /// Creates a new `SequentialBuilder`.
    ///
    /// # Arguments
    /// * `input` - The `(channels, height, width)` of a single input sample.
    /// * `rng` - The random number generator used to initialize the weights.
    pub fn new(input: (usize, usize, usize), rng: &'r mut R) -> Self {
        let (c, h, w) = input;
        Self {
            shape: Shape::Maps { c, h, w },
            layers: Vec::new(),
            params: Vec::new(),
            rng,
        }
    }

    pub fn conv(
        mut self,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        pad: usize,
    ) -> Result<Self> {
        let Shape::Maps { c, h, w } = self.shape else {
            return Err(MlErr::InvalidArch("a convolution must follow feature maps".into()));
        };

        let conv = Conv2d::new(c, out_channels, kernel, stride, pad);
        let (oh, ow) = conv.output_hw(h, w).ok_or_else(|| {
            MlErr::InvalidArch(format!("a {kernel}x{kernel} convolution doesn't fit {h}x{w} maps"))
        })?;

        self.init(conv.patch_len(), out_channels * conv.patch_len(), out_channels)?;
        self.layers.push(Layer::Conv(conv));
        self.shape = Shape::Maps {
            c: out_channels,
            h: oh,
            w: ow,
        };

        Ok(self)
    }

    pub fn max_pool(mut self, kernel: usize, stride: usize) -> Result<Self> {
        let Shape::Maps { c, h, w } = self.shape else {
            return Err(MlErr::InvalidArch("max pooling must follow feature maps".into()));
        };

        let pool = MaxPool2d::new(kernel, stride);
        let (oh, ow) = pool.output_hw(h, w).ok_or_else(|| {
            MlErr::InvalidArch(format!("a {kernel}x{kernel} pool doesn't fit {h}x{w} maps"))
        })?;

        self.layers.push(Layer::MaxPool(pool));
        self.shape = Shape::Maps { c, h: oh, w: ow };
        Ok(self)
    }

    pub fn relu(mut self) -> Self {
        self.layers.push(Layer::relu());
        self
    }

    pub fn sigmoid(mut self, amp: f32) -> Self {
        self.layers.push(Layer::sigmoid(amp));
        self
    }

    pub fn flatten(mut self) -> Self {
        if let Shape::Maps { c, h, w } = self.shape {
            self.layers.push(Layer::flatten());
            self.shape = Shape::Flat(c * h * w);
        }
        self
    }

    pub fn dense(mut self, outputs: usize) -> Result<Self> {
        let Shape::Flat(inputs) = self.shape else {
            return Err(MlErr::InvalidArch("a dense layer must follow a flatten".into()));
        };

        self.init(inputs, inputs * outputs, outputs)?;
        self.layers.push(Layer::dense((inputs, outputs)));
        self.shape = Shape::Flat(outputs);
        Ok(self)
    }

    /// Finishes the build.
    ///
    /// # Returns
    /// The model and its freshly initialized parameters.
    pub fn build(self) -> (Sequential, Vec<f32>) {
        (Sequential::new(self.layers), self.params)
    }

    fn init(&mut self, fan_in: usize, weights: usize, biases: usize) -> Result<()> {
        let std = (2. / fan_in.max(1) as f32).sqrt();
        let normal = Normal::new(0., std)
            .map_err(|e| MlErr::InvalidArch(format!("bad weight distribution: {e}")))?;

        self.params
            .extend(normal.sample_iter(&mut *self.rng).take(weights));
        self.params.extend(std::iter::repeat_n(0., biases));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::arch::Model;

    #[test]
    fn infers_sizes_and_initializes_every_parameter() {
        let mut rng = StdRng::seed_from_u64(7);
        let (model, params) = SequentialBuilder::new((3, 8, 8), &mut rng)
            .conv(4, 3, 1, 1)
            .unwrap()
            .relu()
            .max_pool(2, 2)
            .unwrap()
            .flatten()
            .dense(5)
            .unwrap()
            .build();

        let conv = 4 * (3 * 9 + 1);
        let dense = (4 * 4 * 4 + 1) * 5;
        assert_eq!(model.size(), conv + dense);
        assert_eq!(params.len(), model.size());
        assert!(params[conv - 4..conv].iter().all(|&b| b == 0.));
    }

    #[test]
    fn dense_before_flatten_is_rejected() {
        let mut rng = StdRng::seed_from_u64(7);
        let result = SequentialBuilder::new((1, 4, 4), &mut rng).dense(3);
        assert!(matches!(result, Err(MlErr::InvalidArch(_))));
    }
}

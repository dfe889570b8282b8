use ndarray::{ArrayD, ArrayViewD};

use super::{Conv2d, Dense, Flatten, MaxPool2d, Relu, Sigmoid};
use crate::Result;

pub enum Layer {
    Conv(Conv2d),
    Dense(Dense),
    Flatten(Flatten),
    MaxPool(MaxPool2d),
    Relu(Relu),
    Sigmoid(Sigmoid),
}
use Layer::*;

impl Layer {
    pub fn conv(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        pad: usize,
    ) -> Self {
        Conv(Conv2d::new(in_channels, out_channels, kernel, stride, pad))
    }

    pub fn dense(dim: (usize, usize)) -> Self {
        Dense(Dense::new(dim))
    }

    pub fn flatten() -> Self {
        Flatten(Flatten::default())
    }

    pub fn max_pool(kernel: usize, stride: usize) -> Self {
        MaxPool(MaxPool2d::new(kernel, stride))
    }

    pub fn relu() -> Self {
        Relu(Relu::default())
    }

    pub fn sigmoid(amp: f32) -> Self {
        Sigmoid(Sigmoid::new(amp))
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        match self {
            Conv(l) => l.size(),
            Dense(l) => l.size(),
            Flatten(_) | MaxPool(_) | Relu(_) | Sigmoid(_) => 0,
        }
    }

    /// Returns a short name for this layer.
    pub fn name(&self) -> &'static str {
        match self {
            Conv(_) => "conv2d",
            Dense(_) => "dense",
            Flatten(_) => "flatten",
            MaxPool(_) => "max_pool2d",
            Relu(_) => "relu",
            Sigmoid(_) => "sigmoid",
        }
    }

    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayViewD<f32>,
        train: bool,
    ) -> Result<ArrayD<f32>> {
        match self {
            Conv(l) => l.forward(params, x, train),
            Dense(l) => l.forward(params, x, train),
            Flatten(l) => l.forward(x, train),
            MaxPool(l) => l.forward(x, train),
            Relu(l) => Ok(l.forward(x, train)),
            Sigmoid(l) => Ok(l.forward(x, train)),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        match self {
            Conv(l) => l.backward(params, grad, d),
            Dense(l) => l.backward(params, grad, d),
            Flatten(l) => l.backward(d),
            MaxPool(l) => l.backward(d),
            Relu(l) => l.backward(d),
            Sigmoid(l) => l.backward(d),
        }
    }
}

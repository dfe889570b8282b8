use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::{MlErr, Result};

/// Collapses every axis but the first one, turning `N×C×H×W` feature maps into
/// `N×(C·H·W)` rows.
#[derive(Default)]
pub struct Flatten {
    shape: Option<Vec<usize>>,
}

impl Flatten {
    pub fn forward(&mut self, x: ArrayViewD<f32>, train: bool) -> Result<ArrayD<f32>> {
        let shape = x.shape().to_vec();
        let n = shape.first().copied().unwrap_or_default();
        let rest: usize = shape.iter().skip(1).product();

        let out = x
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&[n, rest]))?;

        self.shape = train.then_some(shape);
        Ok(out)
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let shape = self
            .shape
            .take()
            .ok_or(MlErr::BackwardBeforeForward { layer: "flatten" })?;

        Ok(d.as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&shape))?)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;

    use super::*;

    #[test]
    fn flattens_and_restores_the_shape() {
        let mut flatten = Flatten::default();
        let x = Array4::from_shape_fn((2, 3, 2, 2), |(n, c, y, x)| {
            (n * 12 + c * 4 + y * 2 + x) as f32
        });

        let out = flatten.forward(x.view().into_dyn(), true).unwrap();
        assert_eq!(out.shape(), &[2, 12]);
        assert_eq!(out[[1, 0]], 12.0);

        let back = flatten.backward(out).unwrap();
        assert_eq!(back, x.into_dyn());
    }
}

use ndarray::{ArrayD, ArrayViewD};

use crate::{MlErr, Result};

/// `amp / (1 + e^-z)`, applied element-wise.
#[derive(Debug, Default)]
pub struct Sigmoid {
    amp: f32,
    a: Option<ArrayD<f32>>,
}

impl Sigmoid {
    pub fn new(amp: f32) -> Self {
        Self {
            amp,
            ..Default::default()
        }
    }

    fn sigmoid(&self, z: f32) -> f32 {
        self.amp / (1. + (-z).exp())
    }

    pub fn forward(&mut self, z: ArrayViewD<f32>, train: bool) -> ArrayD<f32> {
        let a = z.mapv(|z| self.sigmoid(z));

        if train {
            self.a = Some(a.clone());
        }
        a
    }

    pub fn backward(&mut self, mut d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let a = self
            .a
            .take()
            .ok_or(MlErr::BackwardBeforeForward { layer: "sigmoid" })?;

        if d.shape() != a.shape() {
            return Err(MlErr::SizeMismatch {
                what: "sigmoid deltas",
                got: d.len(),
                expected: a.len(),
            });
        }

        let amp = self.amp;
        d.zip_mut_with(&a, |d, &a| {
            *d *= (a * (amp - a)) / amp;
        });

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn zero_maps_to_half_the_amplitude() {
        let mut sigmoid = Sigmoid::new(2.0);
        let a = sigmoid.forward(array![0.0].into_dyn().view(), false);
        assert_eq!(a, array![1.0].into_dyn());
    }
}

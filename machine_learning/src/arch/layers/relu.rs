use ndarray::{ArrayD, ArrayViewD, Zip};

use crate::{MlErr, Result};

#[derive(Default)]
pub struct Relu {
    x: Option<ArrayD<f32>>,
}

impl Relu {
    pub fn forward(&mut self, x: ArrayViewD<f32>, train: bool) -> ArrayD<f32> {
        let a = x.mapv(|x| x.max(0.));
        self.x = train.then(|| x.to_owned());
        a
    }

    pub fn backward(&mut self, mut d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = self
            .x
            .take()
            .ok_or(MlErr::BackwardBeforeForward { layer: "relu" })?;

        if d.shape() != x.shape() {
            return Err(MlErr::SizeMismatch {
                what: "relu deltas",
                got: d.len(),
                expected: x.len(),
            });
        }

        Zip::from(&mut d).and(&x).for_each(|d, &x| {
            if x <= 0. {
                *d = 0.;
            }
        });

        Ok(d)
    }
}

use comms::LearningRate;

use super::{Optimizer, optimizer::check_len};
use crate::Result;

/// AdaGrad: every parameter's step is scaled down by the root of its accumulated squared
/// gradients.
#[derive(Debug)]
pub struct AdaGrad {
    learning_rate: LearningRate,
    epsilon: f32,
    h: Box<[f32]>,
}

impl AdaGrad {
    /// Creates a new `AdaGrad` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `epsilon` - Keeps the first steps of rarely updated parameters bounded.
    ///
    /// # Returns
    /// A new `AdaGrad` instance.
    pub fn new(len: usize, learning_rate: LearningRate, epsilon: f32) -> Self {
        Self {
            learning_rate,
            epsilon,
            h: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for AdaGrad {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_len(grad, params, self.h.len())?;

        let lr = self.learning_rate.get();
        let eps = self.epsilon;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.h.iter_mut())
            .for_each(|((p, g), h)| {
                *h += g * g;
                *p -= lr * g / (h.sqrt() + eps);
            });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MlErr;

    #[test]
    fn steps_shrink_as_squared_gradients_accumulate() {
        let lr = LearningRate::new(0.1);
        let mut opt = AdaGrad::new(1, lr.clone(), 0.);
        let mut params = [0.0];

        opt.update_params(&[2.0], &mut params).unwrap();
        assert!((params[0] + 0.1).abs() < 1e-6);

        lr.set(0.2);
        opt.update_params(&[2.0], &mut params).unwrap();
        let second = 0.2 * 2.0 / 8f32.sqrt();
        assert!((params[0] + 0.1 + second).abs() < 1e-6);
    }

    #[test]
    fn mismatched_gradient_is_rejected() {
        let mut opt = AdaGrad::new(2, LearningRate::new(0.1), 1e-8);
        let mut params = [0.0, 0.0];

        assert!(matches!(
            opt.update_params(&[1.0], &mut params),
            Err(MlErr::SizeMismatch { what: "gradient", .. })
        ));
    }
}

use ndarray::ArrayView2;

use crate::{MlErr, Result};

/// Percentage of correct keypoints: the fraction of joints whose predicted point lies within
/// `tolerance` (euclidean distance, in normalized coordinates) of the target.
///
/// Rows are laid out as `x0, y0, x1, y1, ...`.
#[derive(Clone, Copy, Debug)]
pub struct Pck {
    tolerance: f32,
}

impl Pck {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Computes the accuracy of a batch of predictions.
    ///
    /// # Returns
    /// A value in `[0, 1]`, or 0 for an empty batch.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if the shapes differ or a row has an odd length.
    pub fn accuracy(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32> {
        if y_pred.dim() != y.dim() {
            return Err(MlErr::SizeMismatch {
                what: "accuracy targets",
                got: y.len(),
                expected: y_pred.len(),
            });
        }

        if y.ncols() % 2 != 0 {
            return Err(MlErr::SizeMismatch {
                what: "joint coordinates",
                got: y.ncols(),
                expected: y.ncols() + 1,
            });
        }

        let joints = y.len() / 2;
        if joints == 0 {
            return Ok(0.);
        }

        let tol2 = self.tolerance * self.tolerance;
        let mut hits = 0;
        for (p, t) in y_pred.rows().into_iter().zip(y.rows()) {
            for j in (0..p.len()).step_by(2) {
                let (dx, dy) = (p[j] - t[j], p[j + 1] - t[j + 1]);
                if dx * dx + dy * dy <= tol2 {
                    hits += 1;
                }
            }
        }

        Ok(hits as f32 / joints as f32)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn counts_joints_within_tolerance() {
        let pck = Pck::new(0.1);
        let y = array![[0.5, 0.5, 0.2, 0.2], [0.0, 0.0, 1.0, 1.0]];
        let y_pred = array![[0.55, 0.5, 0.5, 0.5], [0.0, 0.05, 1.0, 1.0]];

        assert_eq!(pck.accuracy(y_pred.view(), y.view()).unwrap(), 0.75);
    }

    #[test]
    fn mismatched_shapes_are_an_error() {
        let pck = Pck::new(0.1);
        let y = array![[0.5, 0.5]];
        let y_pred = array![[0.5, 0.5, 0.1, 0.1]];

        assert!(pck.accuracy(y_pred.view(), y.view()).is_err());
    }
}

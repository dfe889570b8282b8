use ndarray::{Array4, ArrayD, ArrayViewD, Ix4, Zip};

use crate::{MlErr, Result};

struct PoolCache {
    input_dim: (usize, usize, usize, usize),
    /// Flat `y·w + x` position of the winner of every output window.
    argmax: Array4<usize>,
}

/// 2D max pooling without padding, the output size is floored.
pub struct MaxPool2d {
    kernel: usize,
    stride: usize,
    cache: Option<PoolCache>,
}

impl MaxPool2d {
    pub fn new(kernel: usize, stride: usize) -> Self {
        Self {
            kernel,
            stride,
            cache: None,
        }
    }

    /// Computes the spatial size of this layer's output, `None` if the window doesn't fit.
    pub fn output_hw(&self, h: usize, w: usize) -> Option<(usize, usize)> {
        let (k, s) = (self.kernel, self.stride);
        if h < k || w < k || s == 0 || k == 0 {
            return None;
        }

        Some(((h - k) / s + 1, (w - k) / s + 1))
    }

    pub fn forward(&mut self, x: ArrayViewD<f32>, train: bool) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, c, h, w) = x.dim();
        let (oh, ow) = self.output_hw(h, w).ok_or_else(|| {
            MlErr::InvalidArch(format!("a {0}x{0} pool doesn't fit a {h}x{w} input", self.kernel))
        })?;

        let (k, s) = (self.kernel, self.stride);
        let mut out = Array4::<f32>::zeros((n, c, oh, ow));
        let mut argmax = Array4::<usize>::zeros((n, c, oh, ow));

        Zip::from(out.outer_iter_mut())
            .and(argmax.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut out, mut argmax, img| {
                for ch in 0..c {
                    for oy in 0..oh {
                        for ox in 0..ow {
                            let mut best = f32::NEG_INFINITY;
                            let mut at = (oy * s) * w + ox * s;
                            for ky in 0..k {
                                for kx in 0..k {
                                    let (iy, ix) = (oy * s + ky, ox * s + kx);
                                    let v = img[[ch, iy, ix]];
                                    if v > best {
                                        best = v;
                                        at = iy * w + ix;
                                    }
                                }
                            }
                            out[[ch, oy, ox]] = best;
                            argmax[[ch, oy, ox]] = at;
                        }
                    }
                }
            });

        self.cache = train.then_some(PoolCache {
            input_dim: (n, c, h, w),
            argmax,
        });

        Ok(out.into_dyn())
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let PoolCache { input_dim, argmax } = self
            .cache
            .take()
            .ok_or(MlErr::BackwardBeforeForward { layer: "max_pool2d" })?;

        let d = d.into_dimensionality::<Ix4>()?;
        if d.dim() != argmax.dim() {
            return Err(MlErr::SizeMismatch {
                what: "max_pool2d deltas",
                got: d.len(),
                expected: argmax.len(),
            });
        }

        let w = input_dim.3;
        let mut dx = Array4::<f32>::zeros(input_dim);

        Zip::from(dx.outer_iter_mut())
            .and(d.outer_iter())
            .and(argmax.outer_iter())
            .par_for_each(|mut dx, d, argmax| {
                Zip::indexed(&d).and(&argmax).for_each(|(ch, _, _), &g, &at| {
                    dx[[ch, at / w, at % w]] += g;
                });
            });

        Ok(dx.into_dyn())
    }
}

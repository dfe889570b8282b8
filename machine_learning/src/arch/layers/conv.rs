use ndarray::{
    Array2, Array3, Array4, ArrayD, ArrayView1, ArrayView2, ArrayView4, ArrayViewD, ArrayViewMut1,
    ArrayViewMut2, Axis, Ix4, Zip, linalg,
};

use crate::{MlErr, Result};

struct ConvCache {
    cols: Array2<f32>,
    input_dim: (usize, usize, usize, usize),
    output_hw: (usize, usize),
}

/// A 2D convolution over `N×C×H×W` inputs, computed as a matrix product over the unrolled
/// input patches (im2col).
///
/// Parameters are laid out as the `out_channels × (in_channels·kernel·kernel)` weights
/// followed by the `out_channels` biases.
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    pad: usize,
    cache: Option<ConvCache>,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        pad: usize,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            stride,
            pad,
            cache: None,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.out_channels * (self.patch_len() + 1)
    }

    /// Returns the amount of inputs a single output value depends on.
    pub fn patch_len(&self) -> usize {
        self.in_channels * self.kernel * self.kernel
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Computes the spatial size of this layer's output.
    ///
    /// # Arguments
    /// * `h`, `w` - The spatial size of the input.
    ///
    /// # Returns
    /// The output height and width or `None` if the kernel doesn't fit the padded input.
    pub fn output_hw(&self, h: usize, w: usize) -> Option<(usize, usize)> {
        let (k, s, p) = (self.kernel, self.stride, self.pad);
        if h + 2 * p < k || w + 2 * p < k || s == 0 {
            return None;
        }

        Some(((h + 2 * p - k) / s + 1, (w + 2 * p - k) / s + 1))
    }

    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayViewD<f32>,
        train: bool,
    ) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, c, h, w) = x.dim();

        if c != self.in_channels {
            return Err(MlErr::SizeMismatch {
                what: "conv2d input channels",
                got: c,
                expected: self.in_channels,
            });
        }

        let (oh, ow) = self.output_hw(h, w).ok_or_else(|| {
            MlErr::InvalidArch(format!("a {0}x{0} kernel doesn't fit a {h}x{w} input", self.kernel))
        })?;

        let cols = self.im2col(x, oh, ow)?;
        let (weights, biases) = self.view_params(params)?;

        let mut z = cols.dot(&weights.t());
        z += &biases;

        let out = z
            .into_shape_with_order((n, oh, ow, self.out_channels))?
            .permuted_axes([0, 3, 1, 2])
            .as_standard_layout()
            .into_owned();

        self.cache = train.then_some(ConvCache {
            cols,
            input_dim: (n, c, h, w),
            output_hw: (oh, ow),
        });

        Ok(out.into_dyn())
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let ConvCache {
            cols,
            input_dim,
            output_hw: (oh, ow),
        } = self
            .cache
            .take()
            .ok_or(MlErr::BackwardBeforeForward { layer: "conv2d" })?;

        let n = input_dim.0;
        let d = d
            .into_dimensionality::<Ix4>()?
            .permuted_axes([0, 2, 3, 1])
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((n * oh * ow, self.out_channels))?;

        let (weights, _) = self.view_params(params)?;
        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &d.t(), &cols, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let dcols = d.dot(&weights);
        let dx = self.col2im(dcols, input_dim, (oh, ow))?;
        Ok(dx.into_dyn())
    }

    /// Unrolls every receptive field of `x` into a row.
    fn im2col(&self, x: ArrayView4<f32>, oh: usize, ow: usize) -> Result<Array2<f32>> {
        let (n, c, h, w) = x.dim();
        let (k, s, p) = (self.kernel, self.stride, self.pad);
        let mut cols = Array3::<f32>::zeros((n, oh * ow, self.patch_len()));

        Zip::from(cols.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut rows, img| {
                for oy in 0..oh {
                    for ox in 0..ow {
                        let mut row = rows.row_mut(oy * ow + ox);
                        for ch in 0..c {
                            for ky in 0..k {
                                let Some(iy) = source_index(oy * s + ky, p, h) else {
                                    continue;
                                };
                                for kx in 0..k {
                                    let Some(ix) = source_index(ox * s + kx, p, w) else {
                                        continue;
                                    };
                                    row[(ch * k + ky) * k + kx] = img[[ch, iy, ix]];
                                }
                            }
                        }
                    }
                }
            });

        Ok(cols.into_shape_with_order((n * oh * ow, self.patch_len()))?)
    }

    /// Folds the patch gradients back into the input layout, summing overlapping windows.
    fn col2im(
        &self,
        dcols: Array2<f32>,
        (n, c, h, w): (usize, usize, usize, usize),
        (oh, ow): (usize, usize),
    ) -> Result<Array4<f32>> {
        let (k, s, p) = (self.kernel, self.stride, self.pad);
        let dcols = dcols.into_shape_with_order((n, oh * ow, self.patch_len()))?;
        let mut dx = Array4::<f32>::zeros((n, c, h, w));

        Zip::from(dx.outer_iter_mut())
            .and(dcols.outer_iter())
            .par_for_each(|mut img, rows| {
                for oy in 0..oh {
                    for ox in 0..ow {
                        let row = rows.row(oy * ow + ox);
                        for ch in 0..c {
                            for ky in 0..k {
                                let Some(iy) = source_index(oy * s + ky, p, h) else {
                                    continue;
                                };
                                for kx in 0..k {
                                    let Some(ix) = source_index(ox * s + kx, p, w) else {
                                        continue;
                                    };
                                    img[[ch, iy, ix]] += row[(ch * k + ky) * k + kx];
                                }
                            }
                        }
                    }
                }
            });

        Ok(dx)
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let w_size = self.size() - self.out_channels;
        let (w_raw, b_raw) = params.split_at(w_size);
        let weights = ArrayView2::from_shape((self.out_channels, self.patch_len()), w_raw)?;
        let biases = ArrayView1::from_shape(self.out_channels, b_raw)?;
        Ok((weights, biases))
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let w_size = self.size() - self.out_channels;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape((self.out_channels, self.patch_len()), dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.out_channels, db_raw)?;
        Ok((dw, db))
    }
}

/// Maps a position in the padded input back to the unpadded one.
fn source_index(padded: usize, pad: usize, len: usize) -> Option<usize> {
    padded.checked_sub(pad).filter(|&i| i < len)
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;

    use super::*;

    #[test]
    fn output_size_follows_stride_and_padding() {
        let conv = Conv2d::new(3, 96, 11, 4, 0);
        assert_eq!(conv.output_hw(220, 220), Some((53, 53)));

        let conv = Conv2d::new(96, 256, 5, 1, 2);
        assert_eq!(conv.output_hw(26, 26), Some((26, 26)));

        assert_eq!(Conv2d::new(1, 1, 5, 1, 0).output_hw(3, 3), None);
    }

    #[test]
    fn identity_kernel_copies_the_input() {
        let mut conv = Conv2d::new(1, 1, 3, 1, 1);
        let mut params = vec![0.0; conv.size()];
        params[4] = 1.0; // center tap
        params[9] = 0.5; // bias

        let x = Array4::from_shape_fn((1, 1, 4, 4), |(_, _, y, x)| (y * 4 + x) as f32);
        let out = conv.forward(&params, x.view().into_dyn(), false).unwrap();

        assert_eq!(out.shape(), &[1, 1, 4, 4]);
        for (got, want) in out.iter().zip(x.iter()) {
            assert_eq!(*got, want + 0.5);
        }
    }

    #[test]
    fn backward_without_training_forward_fails() {
        let mut conv = Conv2d::new(1, 1, 1, 1, 0);
        let params = vec![1.0, 0.0];
        let mut grad = vec![0.0; 2];
        let x = Array4::<f32>::ones((1, 1, 2, 2));

        let out = conv.forward(&params, x.view().into_dyn(), false).unwrap();
        assert!(matches!(
            conv.backward(&params, &mut grad, out),
            Err(MlErr::BackwardBeforeForward { layer: "conv2d" })
        ));
    }
}

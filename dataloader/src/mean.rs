use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use indicatif::ProgressBar;
use log::info;
use machine_learning::checkpoint::{load_tensor, save_tensor};
use ndarray::{Array3, ArrayView3};

use crate::{LoaderErr, Result, reader};

const MEAN: &str = "mean";

/// Accumulates the per-pixel mean of a stream of equally sized images.
///
/// The running sum is kept in `f64`, so long datasets lose no precision.
#[derive(Debug, Default)]
pub struct MeanAccumulator {
    sum: Option<Array3<f64>>,
    count: usize,
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one image to the mean.
    ///
    /// # Errors
    /// If its shape differs from the first image's.
    pub fn add(&mut self, image: ArrayView3<f32>) -> Result<()> {
        if let Some(sum) = &mut self.sum {
            if sum.dim() != image.dim() {
                return Err(LoaderErr::Config(format!(
                    "image {} has shape {:?}, the first one had {:?}",
                    self.count + 1,
                    image.dim(),
                    sum.dim()
                )));
            }
            sum.zip_mut_with(&image, |s, &v| *s += f64::from(v));
        } else {
            self.sum = Some(image.mapv(f64::from));
        }

        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Finishes the accumulation.
    ///
    /// # Errors
    /// If no image was added.
    pub fn finish(self) -> Result<Array3<f32>> {
        let sum = self.sum.ok_or(LoaderErr::Empty { what: "image list" })?;
        let count = self.count as f64;
        Ok(sum.mapv(|s| (s / count) as f32))
    }
}

/// Computes the mean of every image in `paths`, in order.
///
/// # Arguments
/// * `paths` - The images to average.
/// * `progress` - Advanced once per image.
pub fn compute_mean(paths: &[PathBuf], progress: &ProgressBar) -> Result<Array3<f32>> {
    let mut acc = MeanAccumulator::new();

    for path in paths {
        acc.add(reader::decode(path)?.view())?;
        progress.inc(1);
    }

    info!(images = acc.count(); "mean computed");
    acc.finish()
}

/// Writes a mean image to `path`.
pub fn save_mean(path: &Path, mean: &Array3<f32>) -> Result<()> {
    let data = mean.as_standard_layout();
    let data = data
        .as_slice()
        .ok_or_else(|| LoaderErr::Config("the mean image isn't contiguous".into()))?;

    save_tensor(path, MEAN, mean.shape().to_vec(), data, HashMap::new())?;
    Ok(())
}

/// Reads a mean image written by `save_mean`.
///
/// # Errors
/// If the file can't be read or doesn't hold a `C×H×W` tensor.
pub fn load_mean(path: &Path) -> Result<Array3<f32>> {
    let tensor = load_tensor(path, MEAN)?;
    let mean = Array3::from_shape_vec(
        <[usize; 3]>::try_from(tensor.shape.as_slice()).map_err(|_| {
            LoaderErr::Config(format!(
                "the mean in {} has {} axes, expected 3",
                path.display(),
                tensor.shape.len()
            ))
        })?,
        tensor.data,
    )?;

    Ok(mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_images_average_to_their_value() {
        let mut acc = MeanAccumulator::new();
        let image = Array3::from_elem((3, 2, 2), 231.0f32);
        for _ in 0..1000 {
            acc.add(image.view()).unwrap();
        }

        let mean = acc.finish().unwrap();
        assert!(mean.iter().all(|&v| v == 231.0));
    }

    #[test]
    fn shapes_must_agree() {
        let mut acc = MeanAccumulator::new();
        acc.add(Array3::zeros((3, 2, 2)).view()).unwrap();
        assert!(acc.add(Array3::zeros((3, 2, 3)).view()).is_err());
        assert_eq!(acc.count(), 1);
    }

    #[test]
    fn empty_lists_have_no_mean() {
        assert!(matches!(
            MeanAccumulator::new().finish(),
            Err(LoaderErr::Empty { .. })
        ));
    }

    #[test]
    fn mean_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mean.safetensors");
        let mean = Array3::from_shape_fn((3, 2, 4), |(c, y, x)| (c * 8 + y * 4 + x) as f32);

        save_mean(&path, &mean).unwrap();
        assert_eq!(load_mean(&path).unwrap(), mean);
    }
}

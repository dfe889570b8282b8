use std::{path::Path, sync::Arc};

use image::RgbImage;
use ndarray::{Array3, Axis, s};
use rand::Rng;

use crate::{LoaderErr, Result};

const CHANNELS: usize = 3;

/// Loads an image from disk as a `C×H×W` array of raw `[0, 255]` RGB values.
///
/// # Errors
/// If the file is missing or isn't a decodable image.
pub fn decode(path: &Path) -> Result<Array3<f32>> {
    let rgb = open_rgb(path)?;
    let (w, h) = rgb.dimensions();
    Ok(Array3::from_shape_fn((CHANNELS, h as usize, w as usize), |(c, y, x)| {
        rgb.get_pixel(x as u32, y as u32)[c] as f32
    }))
}

fn open_rgb(path: &Path) -> Result<RgbImage> {
    let img = image::open(path).map_err(|source| LoaderErr::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Turns image files into model inputs: crops them to the model's input size, subtracts the
/// mean image and scales them down to roughly `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct ImageReader {
    mean: Arc<Array3<f32>>,
    insize: usize,
}

impl ImageReader {
    /// Creates a new `ImageReader`.
    ///
    /// # Arguments
    /// * `mean` - The `C×H×W` mean of the training images, every image read must share its size.
    /// * `insize` - The side of the square crop the model takes.
    ///
    /// # Errors
    /// If the mean image isn't RGB or is smaller than the crop.
    pub fn new(mean: Arc<Array3<f32>>, insize: usize) -> Result<Self> {
        let (c, h, w) = mean.dim();
        if c != CHANNELS || h < insize || w < insize || insize == 0 {
            return Err(LoaderErr::Config(format!(
                "a {c}x{h}x{w} mean image can't be cropped to {CHANNELS}x{insize}x{insize}"
            )));
        }

        Ok(Self { mean, insize })
    }

    #[inline]
    pub fn insize(&self) -> usize {
        self.insize
    }

    /// Reads one image.
    ///
    /// # Arguments
    /// * `path` - The image file.
    /// * `center` - Whether to take the central crop instead of a random one.
    /// * `flip` - Whether to mirror the image horizontally half of the time. Labels are not
    ///   mirrored along with it.
    /// * `rng` - The source of randomness for the crop and the flip.
    ///
    /// # Returns
    /// A `C×insize×insize` array.
    ///
    /// # Errors
    /// If the image can't be decoded or its size differs from the mean image's.
    pub fn read<R: Rng>(
        &self,
        path: &Path,
        center: bool,
        flip: bool,
        rng: &mut R,
    ) -> Result<Array3<f32>> {
        let rgb = open_rgb(path)?;
        let (w, h) = rgb.dimensions();
        let (w, h) = (w as usize, h as usize);

        let expected = self.mean.dim();
        if (CHANNELS, h, w) != expected {
            return Err(LoaderErr::ImageSize {
                path: path.to_path_buf(),
                got: (CHANNELS, h, w),
                expected,
            });
        }

        let top = self.offset(h, center, rng);
        let left = self.offset(w, center, rng);
        let size = self.insize;
        let mean = self.mean.slice(s![.., top..top + size, left..left + size]);

        let mut image = Array3::from_shape_fn((CHANNELS, size, size), |(c, y, x)| {
            let raw = rgb.get_pixel((left + x) as u32, (top + y) as u32)[c] as f32;
            (raw - mean[[c, y, x]]) / 255.
        });

        if flip && rng.random_bool(0.5) {
            image.invert_axis(Axis(2));
            image = image.as_standard_layout().into_owned();
        }

        Ok(image)
    }

    fn offset<R: Rng>(&self, side: usize, center: bool, rng: &mut R) -> usize {
        let margin = side - self.insize;
        match (center, margin) {
            (true, _) => margin / 2,
            (false, 0) => 0,
            (false, _) => rng.random_range(0..margin),
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn gradient_png(dir: &Path, side: u32) -> std::path::PathBuf {
        let path = dir.join("img.png");
        RgbImage::from_fn(side, side, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 7]))
            .save(&path)
            .unwrap();
        path
    }

    fn reader(side: usize, insize: usize, mean: f32) -> ImageReader {
        let mean = Array3::from_elem((3, side, side), mean);
        ImageReader::new(Arc::new(mean), insize).unwrap()
    }

    #[test]
    fn centered_reads_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = gradient_png(dir.path(), 7);
        let reader = reader(7, 4, 0.);

        let a = reader.read(&path, true, false, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = reader.read(&path, true, false, &mut StdRng::seed_from_u64(2)).unwrap();

        assert_eq!(a.dim(), (3, 4, 4));
        assert_eq!(a, b);
        // margin 3, so the crop starts at (1, 1)
        assert_eq!(a[[0, 0, 0]], 10. / 255.);
        assert_eq!(a[[1, 3, 0]], 40. / 255.);
    }

    #[test]
    fn mean_is_subtracted_before_scaling() {
        let dir = tempfile::tempdir().unwrap();
        let path = gradient_png(dir.path(), 4);
        let reader = reader(4, 4, 7.);

        let image = reader.read(&path, true, false, &mut StdRng::seed_from_u64(0)).unwrap();
        assert!(image.index_axis(Axis(0), 2).iter().all(|&v| v == 0.));
    }

    #[test]
    fn random_crops_stay_inside_the_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = gradient_png(dir.path(), 6);
        let reader = reader(6, 3, 0.);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..20 {
            let image = reader.read(&path, false, true, &mut rng).unwrap();
            assert_eq!(image.dim(), (3, 3, 3));
            assert!(image.iter().all(|&v| (0. ..=1.).contains(&v)));
        }
    }

    #[test]
    fn flipped_reads_mirror_the_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = gradient_png(dir.path(), 6);
        let reader = reader(6, 4, 0.);

        let plain = reader
            .read(&path, true, false, &mut StdRng::seed_from_u64(0))
            .unwrap();
        let mirrored = plain.slice(s![.., .., ..;-1]).to_owned();
        assert_ne!(plain, mirrored);

        let mut flips = 0;
        for seed in 0..32 {
            let image = reader
                .read(&path, true, true, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            if image == mirrored {
                flips += 1;
            } else {
                assert_eq!(image, plain);
            }
        }

        assert!(flips > 0 && flips < 32, "{flips} of 32 reads were flipped");
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = gradient_png(dir.path(), 5);
        let reader = reader(6, 3, 0.);

        let err = reader
            .read(&path, true, false, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, LoaderErr::ImageSize { .. }));
    }

    #[test]
    fn missing_files_fail_to_decode() {
        let reader = reader(6, 3, 0.);
        let err = reader
            .read(Path::new("/nonexistent/img.png"), true, false, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, LoaderErr::Decode { .. }));
    }
}

use std::{num::NonZeroUsize, path::PathBuf};

/// Everything a training run needs, as given by the user.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// The training image-label list.
    pub train: PathBuf,
    /// The validation image-label list.
    pub val: PathBuf,
    /// The directory the image paths of both lists are relative to.
    pub root: PathBuf,
    /// The mean image file, written by `compute_mean`.
    pub mean: PathBuf,
    pub arch: String,
    pub batch_size: NonZeroUsize,
    pub val_batch_size: NonZeroUsize,
    pub epochs: usize,
    /// Accelerator id, negative for the host.
    pub gpu: i32,
    pub loader_jobs: NonZeroUsize,
    /// Where the model is checkpointed on every validation and at the end.
    pub out: PathBuf,
    pub joints: NonZeroUsize,
    pub optimizer: String,
    pub lr: f32,
    pub lr_decay: f32,
    /// Training samples between validation sweeps, 0 disables validation.
    pub val_interval: usize,
    /// Training results averaged into each train record.
    pub log_interval: NonZeroUsize,
    /// PCK distance threshold, in normalized coordinates.
    pub tolerance: f32,
    pub random_crop: bool,
    pub flip: bool,
    pub seed: Option<u64>,
    /// A checkpoint to start from.
    pub resume: Option<PathBuf>,
}

impl TrainingConfig {
    pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(8).unwrap();
    pub const DEFAULT_VAL_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(250).unwrap();
    pub const DEFAULT_LOADER_JOBS: NonZeroUsize = NonZeroUsize::new(20).unwrap();
    pub const DEFAULT_JOINTS: NonZeroUsize = NonZeroUsize::new(14).unwrap();
    pub const DEFAULT_LOG_INTERVAL: NonZeroUsize = NonZeroUsize::new(1000).unwrap();

    /// Creates a config for the given files with every other option at its default.
    pub fn new(train: PathBuf, val: PathBuf, mean: PathBuf, out: PathBuf) -> Self {
        Self {
            train,
            val,
            root: PathBuf::from("."),
            mean,
            arch: "deeppose".into(),
            batch_size: Self::DEFAULT_BATCH_SIZE,
            val_batch_size: Self::DEFAULT_VAL_BATCH_SIZE,
            epochs: 10,
            gpu: -1,
            loader_jobs: Self::DEFAULT_LOADER_JOBS,
            out,
            joints: Self::DEFAULT_JOINTS,
            optimizer: "adagrad".into(),
            lr: 0.001,
            lr_decay: 0.97,
            val_interval: 100_000,
            log_interval: Self::DEFAULT_LOG_INTERVAL,
            tolerance: 0.05,
            random_crop: false,
            flip: false,
            seed: None,
            resume: None,
        }
    }
}

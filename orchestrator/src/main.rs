use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use log::info;
use orchestrator::{configs::TrainingConfig, train};

/// Trains a pose regression network on an image-label list.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the training image-label list file
    #[arg(long)]
    train: PathBuf,
    /// Path to the validation image-label list file
    #[arg(long)]
    val: PathBuf,
    /// Directory the image paths of both lists are relative to
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Path to the mean file, computed by compute_mean
    #[arg(long, default_value = "mean.safetensors")]
    mean: PathBuf,
    /// Network architecture
    #[arg(long, short = 'a', default_value = "deeppose")]
    arch: String,
    /// Learning minibatch size
    #[arg(long = "batchsize", short = 'B', default_value_t = TrainingConfig::DEFAULT_BATCH_SIZE)]
    batch_size: NonZeroUsize,
    /// Validation minibatch size, must divide the validation set size
    #[arg(
        long = "val-batchsize",
        short = 'b',
        default_value_t = TrainingConfig::DEFAULT_VAL_BATCH_SIZE
    )]
    val_batch_size: NonZeroUsize,
    /// Number of epochs to learn
    #[arg(long = "epoch", short = 'E', default_value_t = 10)]
    epochs: usize,
    /// Accelerator id, negative for the host
    #[arg(long, short = 'g', default_value_t = -1, allow_negative_numbers = true)]
    gpu: i32,
    /// Number of parallel image loading threads
    #[arg(long = "loaderjob", short = 'j', default_value_t = TrainingConfig::DEFAULT_LOADER_JOBS)]
    loader_jobs: NonZeroUsize,
    /// Path to the output model checkpoint
    #[arg(long, short = 'o', default_value = "model.safetensors")]
    out: PathBuf,
    /// Number of joints per sample
    #[arg(long, default_value_t = TrainingConfig::DEFAULT_JOINTS)]
    joints: NonZeroUsize,
    /// Optimizer: adagrad, sgd, momentum or adam
    #[arg(long, default_value = "adagrad")]
    optimizer: String,
    /// Initial learning rate
    #[arg(long, default_value_t = 0.001)]
    lr: f32,
    /// Learning rate multiplier applied after every epoch
    #[arg(long, default_value_t = 0.97)]
    lr_decay: f32,
    /// Training samples between validation sweeps, 0 to never validate
    #[arg(long, default_value_t = 100_000)]
    val_interval: usize,
    /// Training results averaged into each train record
    #[arg(long, default_value_t = TrainingConfig::DEFAULT_LOG_INTERVAL)]
    log_interval: NonZeroUsize,
    /// PCK distance threshold, in normalized coordinates
    #[arg(long, default_value_t = 0.05)]
    tolerance: f32,
    /// Crop training images at a random offset instead of the center
    #[arg(long)]
    random_crop: bool,
    /// Randomly mirror training images. Labels are not mirrored
    #[arg(long)]
    flip: bool,
    /// Seed for shuffling, augmentation and weight initialization
    #[arg(long)]
    seed: Option<u64>,
    /// Checkpoint to resume training from
    #[arg(long)]
    resume: Option<PathBuf>,
}

impl From<Args> for TrainingConfig {
    fn from(args: Args) -> Self {
        Self {
            train: args.train,
            val: args.val,
            root: args.root,
            mean: args.mean,
            arch: args.arch,
            batch_size: args.batch_size,
            val_batch_size: args.val_batch_size,
            epochs: args.epochs,
            gpu: args.gpu,
            loader_jobs: args.loader_jobs,
            out: args.out,
            joints: args.joints,
            optimizer: args.optimizer,
            lr: args.lr,
            lr_decay: args.lr_decay,
            val_interval: args.val_interval,
            log_interval: args.log_interval,
            tolerance: args.tolerance,
            random_crop: args.random_crop,
            flip: args.flip,
            seed: args.seed,
            resume: args.resume,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = TrainingConfig::from(Args::parse());

    let summary = train(config).context("training failed")?;
    info!(
        steps = summary.steps,
        epochs = summary.producer.epochs,
        val_sweeps = summary.producer.val_sweeps,
        cancelled = summary.cancelled;
        "training finished"
    );

    Ok(())
}

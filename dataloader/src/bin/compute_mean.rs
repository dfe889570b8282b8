use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dataloader::{dataset, mean};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

/// Computes the per-pixel mean of the images of a dataset list.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the training image-label list file
    #[arg(long, short = 'd')]
    dataset: PathBuf,
    /// Directory the image paths of the list are relative to
    #[arg(long, short = 'r', default_value = ".")]
    root: PathBuf,
    /// Path to the output mean file
    #[arg(long, short = 'o', default_value = "mean.safetensors")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let paths = dataset::read_paths(&args.dataset, &args.root)
        .with_context(|| format!("reading {}", args.dataset.display()))?;
    info!(images = paths.len(); "computing mean");

    let bar = ProgressBar::new(paths.len() as u64);
    let template = "{spinner} [{elapsed_precise}] {pos}/{len} images ({per_sec})";
    bar.set_style(ProgressStyle::with_template(template)?);

    let mean = mean::compute_mean(&paths, &bar)?;
    bar.finish();

    mean::save_mean(&args.output, &mean)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(output:? = args.output; "mean saved");

    Ok(())
}

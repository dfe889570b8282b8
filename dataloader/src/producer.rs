use std::{
    mem,
    num::NonZeroUsize,
    path::Path,
    sync::Arc,
};

use comms::{Batch, BatchSender, LearningRate, Mode, Msg};
use log::{debug, info};
use ndarray::{Array2, Array3, Array4, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::oneshot;

use crate::{Dataset, ImageReader, LoaderErr, Result, dataset::permutation};

type Job = oneshot::Receiver<Result<Array3<f32>>>;

/// How the producer walks the datasets.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub batch_size: NonZeroUsize,
    pub val_batch_size: NonZeroUsize,
    pub epochs: usize,
    /// The amount of threads decoding images.
    pub loader_jobs: NonZeroUsize,
    /// Training samples between validation sweeps, 0 disables validation.
    pub val_interval: usize,
    /// Applied to the learning rate after every epoch.
    pub lr_decay: f32,
    pub random_crop: bool,
    pub flip: bool,
    pub seed: Option<u64>,
}

/// What a finished `Producer::run` went through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub epochs: usize,
    pub samples: usize,
    pub batches: usize,
    pub val_sweeps: usize,
    pub val_batches: usize,
}

/// Feeds the training engine: shuffles the training set every epoch, decodes images on a
/// thread pool, groups them into batches and interleaves validation sweeps.
pub struct Producer {
    config: ProducerConfig,
    train: Dataset,
    val: Dataset,
    reader: Arc<ImageReader>,
    lr: LearningRate,
    rng: StdRng,
}

impl Producer {
    /// Creates a new `Producer`.
    ///
    /// # Arguments
    /// * `config` - The producer's configuration.
    /// * `train` - The training set, visited in a new random order every epoch.
    /// * `val` - The validation set, visited in order.
    /// * `reader` - Reads the images of both sets.
    /// * `lr` - The learning rate to decay between epochs. The producer is its only writer.
    ///
    /// # Errors
    /// If the training set is empty, the sets disagree on the amount of joints or the
    /// validation set can't be split into full validation batches.
    pub fn new(
        config: ProducerConfig,
        train: Dataset,
        val: Dataset,
        reader: ImageReader,
        lr: LearningRate,
    ) -> Result<Self> {
        if train.is_empty() {
            return Err(LoaderErr::Empty {
                what: "training set",
            });
        }

        if train.joints() != val.joints() {
            return Err(LoaderErr::Config(format!(
                "the training set has {} joints but the validation set has {}",
                train.joints(),
                val.joints()
            )));
        }

        let vbs = config.val_batch_size.get();
        if val.len() % vbs != 0 {
            return Err(LoaderErr::Config(format!(
                "{} validation samples can't be split into batches of {vbs}",
                val.len()
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            config,
            train,
            val,
            reader: Arc::new(reader),
            lr,
            rng,
        })
    }

    /// Runs every epoch, sending the batches through `tx`.
    ///
    /// Sends `Switch(Train)` first and `End` last. Every `val_interval` training samples the
    /// whole validation set is sent between a `Switch(Validate)` and a `Switch(Train)`. A batch
    /// left incomplete at the end of an epoch is completed with the next epoch's samples, the
    /// one left after the last epoch is dropped.
    ///
    /// Blocks while the queue is full, so it must run on its own thread.
    ///
    /// # Errors
    /// If an image can't be read or the receiving end is dropped.
    pub fn run(mut self, tx: &BatchSender) -> Result<ProducerStats> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.loader_jobs.get())
            .thread_name(|i| format!("loader-{i}"))
            .build()?;

        let bs = self.config.batch_size.get();
        let center = !self.config.random_crop;
        let flip = self.config.flip;
        let val_interval = self.config.val_interval;

        let mut stats = ProducerStats::default();
        let mut pending = Pending::with_capacity(bs);

        tx.send_blocking(Msg::Switch(Mode::Train))?;

        for epoch in 1..=self.config.epochs {
            info!(epoch = epoch, lr = self.lr.get(); "starting epoch");

            for idx in permutation(self.train.len(), &mut self.rng) {
                let sample = self.train.get(idx);
                let seed = self.rng.random();
                let job = spawn_read(&pool, &self.reader, &sample.path, center, flip, seed);
                pending.push(job, &sample.label);

                if pending.len() == bs {
                    let batch = pending
                        .take(bs)
                        .assemble(self.reader.insize(), self.train.joints())?;
                    tx.send_blocking(Msg::Data(batch))?;
                    stats.batches += 1;
                }

                stats.samples += 1;
                if val_interval > 0 && stats.samples % val_interval == 0 {
                    self.validate(&pool, tx, &mut stats)?;
                }
            }

            let lr = self.lr.decay(self.config.lr_decay);
            debug!(epoch = epoch, lr = lr; "learning rate decayed");
            stats.epochs += 1;
        }

        pending.wait()?;
        drop(pool);

        tx.send_blocking(Msg::End)?;
        info!(batches = stats.batches, val_sweeps = stats.val_sweeps; "producer done");
        Ok(stats)
    }

    fn validate(
        &mut self,
        pool: &ThreadPool,
        tx: &BatchSender,
        stats: &mut ProducerStats,
    ) -> Result<()> {
        tx.send_blocking(Msg::Switch(Mode::Validate))?;
        debug!(samples = self.val.len(); "validation sweep");

        let vbs = self.config.val_batch_size.get();
        for chunk in self.val.samples().chunks_exact(vbs) {
            let mut pending = Pending::with_capacity(vbs);
            for sample in chunk {
                let seed = self.rng.random();
                let job = spawn_read(pool, &self.reader, &sample.path, true, false, seed);
                pending.push(job, &sample.label);
            }

            let batch = pending.assemble(self.reader.insize(), self.val.joints())?;
            tx.send_blocking(Msg::Data(batch))?;
            stats.val_batches += 1;
        }

        tx.send_blocking(Msg::Switch(Mode::Train))?;
        stats.val_sweeps += 1;
        Ok(())
    }
}

/// Queues the read of one image on the pool.
fn spawn_read(
    pool: &ThreadPool,
    reader: &Arc<ImageReader>,
    path: &Path,
    center: bool,
    flip: bool,
    seed: u64,
) -> Job {
    let (tx, rx) = oneshot::channel();
    let reader = Arc::clone(reader);
    let path = path.to_path_buf();

    pool.spawn(move || {
        let mut rng = StdRng::seed_from_u64(seed);
        // The receiver is gone only if the producer already failed.
        let _ = tx.send(reader.read(&path, center, flip, &mut rng));
    });

    rx
}

/// The batch being filled: its decode jobs and the labels of their images.
struct Pending {
    jobs: Vec<Job>,
    labels: Vec<f32>,
}

impl Pending {
    fn with_capacity(n: usize) -> Self {
        Self {
            jobs: Vec::with_capacity(n),
            labels: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }

    fn push(&mut self, job: Job, label: &[f32]) {
        self.jobs.push(job);
        self.labels.extend_from_slice(label);
    }

    fn take(&mut self, n: usize) -> Self {
        mem::replace(self, Self::with_capacity(n))
    }

    /// Waits for every job and puts the batch together.
    fn assemble(self, insize: usize, joints: usize) -> Result<Batch> {
        let n = self.jobs.len();
        let mut x = Array4::<f32>::zeros((n, 3, insize, insize));

        for (i, job) in self.jobs.into_iter().enumerate() {
            let image = job.blocking_recv().map_err(|_| LoaderErr::JobLost)??;
            x.index_axis_mut(Axis(0), i).assign(&image);
        }

        let y = Array2::from_shape_vec((n, 2 * joints), self.labels)?;
        Ok(Batch::new(x, y)?)
    }

    /// Waits for every job, discarding the images.
    fn wait(self) -> Result<()> {
        for job in self.jobs {
            job.blocking_recv().map_err(|_| LoaderErr::JobLost)??;
        }
        Ok(())
    }
}

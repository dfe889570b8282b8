use std::{path::PathBuf, sync::Arc};

use comms::{Batch, BatchReceiver, Mode, Msg, Report, ReportSender};
use log::{debug, info, warn};
use machine_learning::training::Trainer;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

type Owned = Box<dyn Trainer>;

/// The training engine: consumes batches, trains or evaluates the model on each of them and
/// hands the results off to the metrics logger.
///
/// Concurrency note:
/// - Compute is CPU-bound and runs on Tokio's blocking pool via `spawn_blocking`.
/// - The trainer is moved into each blocking task and handed back when it finishes.
pub struct Engine {
    trainer: Owned,
    out: Arc<PathBuf>,
}

impl Engine {
    /// Creates a new `Engine`.
    ///
    /// # Arguments
    /// * `trainer` - The model being trained, with its optimizer and loss.
    /// * `out` - Where to checkpoint the model whenever a validation sweep starts.
    ///
    /// # Returns
    /// A new `Engine` instance.
    pub fn new(trainer: Owned, out: PathBuf) -> Self {
        Self {
            trainer,
            out: Arc::new(out),
        }
    }

    /// Runs until the producer sends `End` or `token` is cancelled, forwarding `End` to the
    /// logger in both cases. Starts in training mode.
    ///
    /// # Arguments
    /// * `rx` - The receiving end of the batch queue.
    /// * `tx` - The sending end of the report queue.
    /// * `token` - Stops the engine between two batches.
    ///
    /// # Returns
    /// The trainer, so the final model can be saved.
    ///
    /// # Errors
    /// If a training step or a checkpoint fails, or if either queue closes early.
    pub async fn run(
        self,
        mut rx: BatchReceiver,
        tx: ReportSender,
        token: CancellationToken,
    ) -> Result<Owned> {
        let Self { mut trainer, out } = self;
        let mut mode = Mode::Train;

        loop {
            let msg = tokio::select! {
                biased;
                () = token.cancelled() => None,
                msg = rx.recv() => Some(msg?),
            };

            let Some(msg) = msg else {
                warn!(steps = trainer.steps(); "training cancelled");
                tx.send(Msg::End).await?;
                break;
            };

            debug!(kind = msg.kind(); "engine received");
            match msg {
                Msg::Data(batch) => {
                    let (stepped, report) = step(trainer, mode, batch).await?;
                    trainer = stepped;
                    tx.send(Msg::Data(report)).await?;
                }
                Msg::Switch(next) => {
                    tx.send(Msg::Switch(next)).await?;
                    mode = next;

                    if mode == Mode::Validate {
                        trainer = checkpoint(trainer, Arc::clone(&out)).await?;
                    }
                }
                Msg::End => {
                    tx.send(Msg::End).await?;
                    break;
                }
            }
        }

        info!(steps = trainer.steps(); "engine done");
        Ok(trainer)
    }
}

/// Trains on or evaluates a single batch on the blocking pool.
async fn step(mut trainer: Owned, mode: Mode, batch: Batch) -> Result<(Owned, Report)> {
    let (trainer, report) = task::spawn_blocking(move || {
        let report = match mode {
            Mode::Train => trainer.train_batch(batch.x.view(), batch.y.view()),
            Mode::Validate => trainer.evaluate(batch.x.view(), batch.y.view()),
        };
        (trainer, report)
    })
    .await?;

    Ok((trainer, report?))
}

async fn checkpoint(trainer: Owned, out: Arc<PathBuf>) -> Result<Owned> {
    let (trainer, saved) = task::spawn_blocking(move || {
        let saved = trainer.save(&out);
        (trainer, saved)
    })
    .await?;

    saved?;
    info!(steps = trainer.steps(); "checkpoint written");
    Ok(trainer)
}

use std::{
    io,
    path::PathBuf,
    process,
    sync::Arc,
    thread::{self, JoinHandle},
};

use comms::LearningRate;
use dataloader::{Dataset, ImageReader, LoaderErr, Producer, ProducerStats, mean};
use log::{info, warn};
use machine_learning::{
    arch,
    checkpoint::Checkpoint,
    training::{Trainer, TrainerBuilder},
};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::{
    configs::{Adapter, TrainingConfig},
    engine::Engine,
    error::{OrchestratorError, Result},
    logger::{LoggerConfig, LoggerSummary, MetricsLogger},
};

/// What a finished training session went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingSummary {
    /// The amount of optimizer updates made by this run.
    pub steps: usize,
    /// Left at its default when the run was cancelled.
    pub producer: ProducerStats,
    pub logger: LoggerSummary,
    pub cancelled: bool,
}

/// A training session, ready to run. Everything that can fail before the pipeline starts
/// was already checked when this was created.
pub struct Session {
    runtime: Runtime,
    out: PathBuf,
    trainer: Box<dyn Trainer>,
    producer: Producer,
    logger: LoggerConfig,
    token: CancellationToken,
}

impl Session {
    /// Creates a new `Session`: validates the configuration, loads both datasets and the mean
    /// image and builds the model, restoring it from a checkpoint if asked to.
    ///
    /// # Arguments
    /// * `config` - The configuration of the whole run.
    ///
    /// # Errors
    /// If the configuration is invalid or any of its files can't be read.
    pub fn new(config: TrainingConfig) -> Result<Self> {
        let adapter = Adapter::new();
        adapter.validate(&config)?;

        if config.gpu >= 0 {
            warn!(gpu = config.gpu; "accelerators aren't supported, training on the host");
        }

        let joints = config.joints.get();
        let train = Dataset::load(&config.train, &config.root, joints)?;
        let val = Dataset::load(&config.val, &config.root, joints)?;
        adapter.validate_val_size(&config, val.len())?;
        info!(train = train.len(), val = val.len(); "datasets loaded");

        let insize = arch::insize(&config.arch)?;
        let mean = mean::load_mean(&config.mean)?;
        let reader = ImageReader::new(Arc::new(mean), insize)?;

        let lr = LearningRate::new(config.lr);
        let spec = adapter.trainer_spec(&config, lr.clone());
        let mut trainer = TrainerBuilder::new().build(&spec)?;

        if let Some(path) = &config.resume {
            trainer.restore(Checkpoint::load(path)?)?;
            info!(path:? = path, steps = trainer.steps(); "resumed from checkpoint");
        }

        let logger = adapter.logger_config(&config, val.len());
        let producer = Producer::new(adapter.producer_config(&config), train, val, reader, lr)?;

        Ok(Self {
            runtime: Runtime::new()?,
            out: config.out,
            trainer,
            producer,
            logger,
            token: CancellationToken::new(),
        })
    }

    /// Returns a token that stops the session between two batches once cancelled.
    ///
    /// Ctrl-C cancels it too.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Runs the whole pipeline until the last epoch is done or the session is cancelled, then
    /// writes the final checkpoint.
    ///
    /// # Returns
    /// What the run went through.
    ///
    /// The first Ctrl-C cancels the session. A second one, or any Ctrl-C once the engine has
    /// stopped, exits the process without waiting for the final checkpoint.
    ///
    /// # Errors
    /// The first failure of the pipeline. When a stage fails the others stop as a consequence,
    /// only the root cause is reported.
    pub fn run(self) -> Result<TrainingSummary> {
        let Self {
            runtime,
            out,
            trainer,
            producer,
            logger,
            token,
        } = self;

        let (batch_tx, batch_rx) = comms::hand_off(1);
        let (report_tx, report_rx) = comms::unbounded();

        let producer = thread::Builder::new()
            .name("producer".into())
            .spawn(move || producer.run(&batch_tx))?;

        let logger = thread::Builder::new()
            .name("logger".into())
            .spawn(move || MetricsLogger::with_spinner(logger, io::stdout()).run(report_rx))?;

        let ctrl_c = token.clone();
        runtime.spawn(async move {
            if watch_interrupts(ctrl_c, tokio::signal::ctrl_c).await {
                warn!("interrupted again, exiting");
                process::exit(130);
            }
        });

        let engine = Engine::new(trainer, out.clone());
        let trained = runtime.block_on(engine.run(batch_rx, report_tx, token.clone()));

        // From here on a single Ctrl-C exits.
        let cancelled = token.is_cancelled();
        token.cancel();

        let produced = join(producer, "producer")?;
        let logged = join(logger, "logger")?;

        let (producer, trainer, logger) = settle(produced, trained, logged, cancelled)?;

        trainer.save(&out)?;
        info!(
            path:? = out,
            steps = trainer.steps(),
            cancelled = cancelled;
            "final checkpoint written"
        );

        Ok(TrainingSummary {
            steps: trainer.steps(),
            producer,
            logger,
            cancelled,
        })
    }
}

/// Cancels `token` on the first interrupt.
///
/// # Returns
/// `true` once an interrupt arrives with `token` already cancelled, `false` if interrupts
/// can no longer be listened to.
async fn watch_interrupts<F, Fut>(token: CancellationToken, mut interrupted: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    while interrupted().await.is_ok() {
        if token.is_cancelled() {
            return true;
        }

        warn!("interrupted, stopping after the current batch");
        token.cancel();
    }

    false
}

/// Picks what to report once every stage has stopped. A stage that failed only because its
/// neighbour went away yields to the neighbour's own error.
fn settle(
    produced: dataloader::Result<ProducerStats>,
    trained: Result<Box<dyn Trainer>>,
    logged: Result<LoggerSummary>,
    cancelled: bool,
) -> Result<(ProducerStats, Box<dyn Trainer>, LoggerSummary)> {
    let producer = match produced {
        Ok(stats) => stats,
        Err(LoaderErr::Comms(_)) if cancelled || trained.is_err() => ProducerStats::default(),
        Err(e) => return Err(e.into()),
    };

    match (trained, logged) {
        (Ok(trainer), Ok(logger)) => Ok((producer, trainer, logger)),
        // The engine can't hand off reports once the logger is gone.
        (Err(OrchestratorError::Comms(_)), Err(e)) => Err(e),
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
    }
}

fn join<T>(handle: JoinHandle<T>, stage: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| OrchestratorError::Join(format!("the {stage} thread panicked")))
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, future, io::Write, num::NonZeroUsize};

    use comms::{Batch, CommsErr, Mode, Msg};
    use indicatif::ProgressBar;
    use machine_learning::{MlErr, training::TrainerSpec};
    use ndarray::{Array2, Array4};
    use tokio::task;

    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn trainer() -> Box<dyn Trainer> {
        let spec = TrainerSpec {
            arch: "tiny".into(),
            joints: 1,
            optimizer: "sgd".into(),
            learning_rate: LearningRate::new(0.01),
            tolerance: 0.1,
            seed: Some(5),
        };
        TrainerBuilder::new().build(&spec).unwrap()
    }

    fn batch() -> Batch {
        let x = Array4::from_elem((2, 3, 16, 16), 0.25);
        let y = Array2::from_elem((2, 2), 0.5);
        Batch::new(x, y).unwrap()
    }

    fn receiver_gone() -> LoaderErr {
        LoaderErr::Comms(CommsErr::Closed { side: "receiving" })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_failing_logger_is_reported_instead_of_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let (batch_tx, batch_rx) = comms::hand_off(8);
        let (report_tx, report_rx) = comms::unbounded();

        let config = LoggerConfig {
            batch_size: NonZeroUsize::new(2).unwrap(),
            val_batch_size: NonZeroUsize::new(1).unwrap(),
            val_size: 0,
            log_interval: NonZeroUsize::new(1).unwrap(),
        };
        let logger = thread::spawn(move || {
            MetricsLogger::new(config, BrokenPipe, ProgressBar::hidden()).run(report_rx)
        });

        let engine = Engine::new(trainer(), dir.path().join("model.safetensors"));
        let engine = tokio::spawn(engine.run(batch_rx, report_tx, CancellationToken::new()));

        batch_tx.send(Msg::Switch(Mode::Train)).await.unwrap();
        batch_tx.send(Msg::Data(batch())).await.unwrap();
        let logged = task::spawn_blocking(move || join(logger, "logger"))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(logged, Err(OrchestratorError::Io(_))));

        // The engine only notices on its next report.
        batch_tx.send(Msg::Data(batch())).await.unwrap();
        let trained = engine.await.unwrap();
        assert!(matches!(trained, Err(OrchestratorError::Comms(_))));

        let settled = settle(Err(receiver_gone()), trained, logged, false);
        assert!(matches!(
            settled,
            Err(OrchestratorError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe
        ));
    }

    fn interrupts(
        mut pending: VecDeque<io::Result<()>>,
    ) -> impl FnMut() -> future::Ready<io::Result<()>> {
        move || {
            let next = pending.pop_front();
            future::ready(next.unwrap_or_else(|| Err(io::ErrorKind::Other.into())))
        }
    }

    #[tokio::test]
    async fn the_first_interrupt_cancels_and_the_second_exits() {
        let token = CancellationToken::new();
        let exits = watch_interrupts(token.clone(), interrupts(VecDeque::from([Ok(()), Ok(())])));

        assert!(exits.await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn a_single_interrupt_only_cancels() {
        let token = CancellationToken::new();
        let exits = watch_interrupts(token.clone(), interrupts(VecDeque::from([Ok(())])));

        assert!(!exits.await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn any_interrupt_exits_once_the_engine_stopped() {
        let token = CancellationToken::new();
        token.cancel();

        assert!(watch_interrupts(token, interrupts(VecDeque::from([Ok(())]))).await);
    }

    #[test]
    fn an_engine_failure_outranks_the_stages_it_stopped() {
        let trained = Err(OrchestratorError::Ml(MlErr::NonFinite { what: "loss" }));
        let logged = Err(OrchestratorError::Comms(CommsErr::Closed { side: "sending" }));

        let settled = settle(Err(receiver_gone()), trained, logged, false);
        assert!(matches!(settled, Err(OrchestratorError::Ml(MlErr::NonFinite { .. }))));
    }

    #[test]
    fn a_closed_batch_queue_is_expected_after_cancellation() {
        let logged = Ok(LoggerSummary::default());

        let settled = settle(Err(receiver_gone()), Ok(trainer()), logged, true);
        assert!(matches!(settled, Ok((stats, _, _)) if stats == ProducerStats::default()));
    }
}

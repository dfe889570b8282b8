use std::{
    io::Write,
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use comms::{Mode, Msg, Report, ReportReceiver};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use serde::Serialize;

use crate::error::{OrchestratorError, Result};

/// How the logger aggregates results into records.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub batch_size: NonZeroUsize,
    pub val_batch_size: NonZeroUsize,
    /// The amount of samples in the validation set.
    pub val_size: usize,
    /// Training results averaged into each train record.
    pub log_interval: NonZeroUsize,
}

/// One line of the metrics stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub kind: Mode,
    pub iteration: usize,
    /// One minus the mean accuracy.
    pub error: f32,
    pub loss: f32,
}

/// What a finished logger wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerSummary {
    pub updates: usize,
    pub train_records: usize,
    pub val_records: usize,
}

#[derive(Default)]
struct Window {
    loss: f64,
    accuracy: f64,
    count: usize,
}

impl Window {
    fn add(&mut self, report: Report) {
        self.loss += report.loss as f64;
        self.accuracy += report.accuracy as f64;
        self.count += 1;
    }
}

/// Turns the engine's reports into periodic JSON records on `out` and a status line.
pub struct MetricsLogger<W> {
    config: LoggerConfig,
    out: W,
    bar: ProgressBar,
    summary: LoggerSummary,

    mode: Mode,
    train: Window,
    train_begin: Instant,
    val: Window,
    val_processed: usize,
    val_begin: Option<Instant>,
}

impl<W: Write> MetricsLogger<W> {
    /// Creates a new `MetricsLogger`.
    ///
    /// # Arguments
    /// * `config` - How to aggregate results.
    /// * `out` - Where to write the records, one JSON object per line.
    /// * `bar` - Shows the live status line, may be hidden.
    pub fn new(config: LoggerConfig, out: W, bar: ProgressBar) -> Self {
        let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);

        Self {
            config,
            out,
            bar,
            summary: LoggerSummary::default(),
            mode: Mode::Train,
            train: Window::default(),
            train_begin: Instant::now(),
            val: Window::default(),
            val_processed: 0,
            val_begin: None,
        }
    }

    /// Creates a logger with a spinner on stderr, hidden when stderr isn't a terminal.
    pub fn with_spinner(config: LoggerConfig, out: W) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(250));
        Self::new(config, out, bar)
    }

    /// Receives reports until the engine sends `End`.
    ///
    /// Blocks on every receive, so it must run on its own thread.
    ///
    /// # Errors
    /// If a record can't be written, the validation set overruns or the engine goes away
    /// without sending `End`.
    pub fn run(mut self, mut rx: ReportReceiver) -> Result<LoggerSummary> {
        while self.handle(rx.recv_blocking()?)? {}
        Ok(self.summary)
    }

    /// Processes a single message.
    ///
    /// # Returns
    /// Whether more messages are expected, `false` after `End`.
    pub fn handle(&mut self, msg: Msg<Report>) -> Result<bool> {
        match msg {
            Msg::Switch(Mode::Train) => {
                if let Some(val_begin) = self.val_begin.take() {
                    self.train_begin += val_begin.elapsed();
                }
                self.train = Window::default();
                self.mode = Mode::Train;
            }
            Msg::Switch(Mode::Validate) => {
                self.val = Window::default();
                self.val_processed = 0;
                self.val_begin = Some(Instant::now());
                self.mode = Mode::Validate;
            }
            Msg::Data(report) => match self.mode {
                Mode::Train => self.on_train(report)?,
                Mode::Validate => self.on_val(report)?,
            },
            Msg::End => {
                self.bar.finish_and_clear();
                self.out.flush()?;
                info!(
                    updates = self.summary.updates,
                    train_records = self.summary.train_records,
                    val_records = self.summary.val_records;
                    "logger done"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn on_train(&mut self, report: Report) -> Result<()> {
        self.summary.updates += 1;
        self.train.add(report);

        let seen = self.summary.updates * self.config.batch_size.get();
        let elapsed = self.train_begin.elapsed();
        self.bar.set_message(format!(
            "train {} updates, {seen} samples, {:.1} images/sec",
            self.summary.updates,
            per_sec(seen, elapsed)
        ));

        if self.train.count == self.config.log_interval.get() {
            let n = self.train.count as f64;
            let record = Record {
                kind: Mode::Train,
                iteration: self.summary.updates,
                error: (1. - self.train.accuracy / n) as f32,
                loss: (self.train.loss / n) as f32,
            };
            self.emit(&record)?;
            self.summary.train_records += 1;
            self.train = Window::default();
        }

        Ok(())
    }

    fn on_val(&mut self, report: Report) -> Result<()> {
        let size = self.config.val_size;
        let vbs = self.config.val_batch_size.get();

        self.val.add(report);
        self.val_processed += vbs;

        if self.val_processed > size {
            return Err(OrchestratorError::ValidationOverrun {
                processed: self.val_processed,
                size,
            });
        }

        let elapsed = self.val_begin.map(|t| t.elapsed()).unwrap_or_default();
        self.bar.set_message(format!(
            "val {}/{size} samples, {:.1} images/sec",
            self.val_processed,
            per_sec(self.val_processed, elapsed)
        ));

        if self.val_processed == size {
            // Every batch loss is already a mean over the batch.
            let scale = vbs as f64 / size as f64;
            let record = Record {
                kind: Mode::Validate,
                iteration: self.summary.updates,
                error: (1. - self.val.accuracy * scale) as f32,
                loss: (self.val.loss * scale) as f32,
            };
            self.emit(&record)?;
            self.summary.val_records += 1;
        }

        Ok(())
    }

    fn emit(&mut self, record: &Record) -> Result<()> {
        debug!(iteration = record.iteration; "metrics record");
        let line = serde_json::to_string(record)?;
        self.bar.suspend(|| writeln!(self.out, "{line}"))?;
        Ok(())
    }

    /// Consumes the logger, giving back its output.
    pub fn into_inner(self) -> W {
        self.out
    }
}

fn per_sec(samples: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0. { samples as f64 / secs } else { 0. }
}

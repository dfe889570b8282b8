use std::path::Path;

use comms::Report;
use log::debug;
use ndarray::{Array2, ArrayView2, ArrayView4, Ix2};

use super::Trainer;
use crate::{
    MlErr, Result,
    arch::{Model, loss::LossFn},
    checkpoint::{Checkpoint, CheckpointMeta},
    metrics::Pck,
    optimization::Optimizer,
};

/// A model `Trainer`. Contains the relevant components needed for training a model,
/// including the model itself and its parameters.
pub struct ModelTrainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    model: M,
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: O,
    loss_fn: L,
    metric: Pck,
    meta: CheckpointMeta,
    steps: usize,
}

impl<M, O, L> ModelTrainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    /// Returns a new `ModelTrainer`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `params` - The model's initial parameters.
    /// * `optimizer` - The update rule applied after every training batch.
    /// * `loss_fn` - The loss function used to measure the difference between a model's output
    ///   and the expected one.
    /// * `metric` - The accuracy metric reported next to the loss.
    /// * `meta` - What identifies the network in its checkpoints.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if `params` doesn't fit `model`.
    pub fn new(
        model: M,
        params: Vec<f32>,
        optimizer: O,
        loss_fn: L,
        metric: Pck,
        meta: CheckpointMeta,
    ) -> Result<Self> {
        if params.len() != model.size() {
            return Err(MlErr::SizeMismatch {
                what: "initial params",
                got: params.len(),
                expected: model.size(),
            });
        }

        Ok(Self {
            grad: vec![0.; params.len()],
            model,
            params,
            optimizer,
            loss_fn,
            metric,
            meta,
            steps: 0,
        })
    }

    fn forward(
        &mut self,
        x: ArrayView4<f32>,
        y: ArrayView2<f32>,
        train: bool,
    ) -> Result<(Array2<f32>, Report)> {
        if x.len_of(ndarray::Axis(0)) != y.nrows() {
            return Err(MlErr::SizeMismatch {
                what: "batch labels",
                got: y.nrows(),
                expected: x.len_of(ndarray::Axis(0)),
            });
        }

        let y_pred = self
            .model
            .forward(&self.params, x.into_dyn(), train)?
            .into_dimensionality::<Ix2>()?;

        if y_pred.dim() != y.dim() {
            return Err(MlErr::SizeMismatch {
                what: "label columns",
                got: y.ncols(),
                expected: y_pred.ncols(),
            });
        }

        let loss = self.loss_fn.loss(y_pred.view(), y);
        if !loss.is_finite() {
            return Err(MlErr::NonFinite { what: "loss" });
        }

        let accuracy = self.metric.accuracy(y_pred.view(), y)?;
        Ok((y_pred, Report { loss, accuracy }))
    }
}

impl<M, O, L> Trainer for ModelTrainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    fn train_batch(&mut self, x: ArrayView4<f32>, y: ArrayView2<f32>) -> Result<Report> {
        self.grad.fill(0.);

        let (y_pred, report) = self.forward(x, y, true)?;
        let d = self.loss_fn.loss_prime(y_pred.view(), y);

        self.model.backward(&self.params, &mut self.grad, d.into_dyn())?;
        self.optimizer.update_params(&self.grad, &mut self.params)?;
        self.steps += 1;

        Ok(report)
    }

    fn evaluate(&mut self, x: ArrayView4<f32>, y: ArrayView2<f32>) -> Result<Report> {
        self.forward(x, y, false).map(|(_, report)| report)
    }

    fn steps(&self) -> usize {
        self.steps
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn restore(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint.meta != self.meta {
            let CheckpointMeta {
                arch,
                joints,
                insize,
            } = &checkpoint.meta;
            return Err(MlErr::InvalidArch(format!(
                "the checkpoint belongs to {arch} with {joints} joints and {insize}px inputs, \
                 this run trains {} with {} joints and {}px inputs",
                self.meta.arch, self.meta.joints, self.meta.insize
            )));
        }

        if checkpoint.params.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "checkpoint params",
                got: checkpoint.params.len(),
                expected: self.params.len(),
            });
        }

        self.params = checkpoint.params;
        debug!(arch = self.meta.arch.as_str(); "parameters restored");
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        Checkpoint::save(path, &self.meta, &self.params)
    }
}

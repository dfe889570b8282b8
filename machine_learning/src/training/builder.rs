use comms::LearningRate;
use log::info;
use rand::{SeedableRng, rngs::StdRng};

use super::{ModelTrainer, Trainer};
use crate::{
    Result,
    arch::{self, Architecture, Model, loss::{LossFn, Mse}},
    checkpoint::CheckpointMeta,
    metrics::Pck,
    optimization::{self, Optimizer},
};

/// Everything needed to put together a `Trainer`.
#[derive(Debug, Clone)]
pub struct TrainerSpec {
    pub arch: String,
    pub joints: usize,
    pub optimizer: String,
    pub learning_rate: LearningRate,
    pub tolerance: f32,
    pub seed: Option<u64>,
}

/// Builds `Trainer`s given a specification.
#[derive(Default)]
pub struct TrainerBuilder;

impl TrainerBuilder {
    /// Creates a new `TrainerBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new `Trainer` following a spec.
    ///
    /// # Arguments
    /// * `spec` - The specification for the trainer.
    ///
    /// # Errors
    /// If the architecture or the optimizer are unknown.
    pub fn build(&self, spec: &TrainerSpec) -> Result<Box<dyn Trainer>> {
        self.resolve_model(spec)
    }

    fn resolve_model(&self, spec: &TrainerSpec) -> Result<Box<dyn Trainer>> {
        let mut rng = self.generate_rng(spec.seed);
        let Architecture {
            name,
            insize,
            model,
            params,
        } = arch::build(&spec.arch, spec.joints, &mut rng)?;

        info!(arch = name, params = params.len(), insize = insize; "model ready");

        let meta = CheckpointMeta {
            arch: name.to_string(),
            joints: spec.joints,
            insize,
        };

        self.resolve_optimizer(spec, model, params, meta)
    }

    fn resolve_optimizer<M>(
        &self,
        spec: &TrainerSpec,
        model: M,
        params: Vec<f32>,
        meta: CheckpointMeta,
    ) -> Result<Box<dyn Trainer>>
    where
        M: Model + 'static,
    {
        let lr = spec.learning_rate.clone();
        let optimizer = optimization::build(&spec.optimizer, params.len(), lr)?;
        self.resolve_loss(spec, model, params, optimizer, meta)
    }

    fn resolve_loss<M, O>(
        &self,
        spec: &TrainerSpec,
        model: M,
        params: Vec<f32>,
        optimizer: O,
        meta: CheckpointMeta,
    ) -> Result<Box<dyn Trainer>>
    where
        M: Model + 'static,
        O: Optimizer + 'static,
    {
        self.terminate_build(spec, model, params, optimizer, Mse::new(), meta)
    }

    fn terminate_build<M, O, L>(
        &self,
        spec: &TrainerSpec,
        model: M,
        params: Vec<f32>,
        optimizer: O,
        loss: L,
        meta: CheckpointMeta,
    ) -> Result<Box<dyn Trainer>>
    where
        M: Model + 'static,
        O: Optimizer + 'static,
        L: LossFn + 'static,
    {
        let metric = Pck::new(spec.tolerance);
        let trainer = ModelTrainer::new(model, params, optimizer, loss, metric, meta)?;
        Ok(Box::new(trainer))
    }

    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

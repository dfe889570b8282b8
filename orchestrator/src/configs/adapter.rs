use comms::LearningRate;
use dataloader::ProducerConfig;
use machine_learning::{arch, optimization, training::TrainerSpec};

use super::TrainingConfig;
use crate::{error::OrchestratorError, logger::LoggerConfig};

/// Checks a `TrainingConfig` and splits it into the configuration of every pipeline stage.
#[derive(Default)]
pub struct Adapter;

impl Adapter {
    pub fn new() -> Self {
        Self
    }

    /// Checks everything that can be checked without reading the datasets.
    ///
    /// # Errors
    /// `OrchestratorError::InvalidConfig` describing the first problem found.
    pub fn validate(&self, config: &TrainingConfig) -> Result<(), OrchestratorError> {
        arch::insize(&config.arch).map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))?;

        if !optimization::OPTIMIZERS.contains(&config.optimizer.as_str()) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "unknown optimizer {:?}, expected one of {:?}",
                config.optimizer,
                optimization::OPTIMIZERS
            )));
        }

        let positive = [("lr", config.lr), ("lr-decay", config.lr_decay)];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0. {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if !config.tolerance.is_finite() || config.tolerance < 0. {
            return Err(OrchestratorError::InvalidConfig(format!(
                "tolerance must be a non negative number, got {}",
                config.tolerance
            )));
        }

        Ok(())
    }

    /// Checks that the validation set splits into full validation batches.
    ///
    /// # Errors
    /// `OrchestratorError::InvalidConfig` if it doesn't.
    pub fn validate_val_size(
        &self,
        config: &TrainingConfig,
        val_size: usize,
    ) -> Result<(), OrchestratorError> {
        let vbs = config.val_batch_size.get();
        if val_size % vbs != 0 {
            return Err(OrchestratorError::InvalidConfig(format!(
                "the validation set has {val_size} samples, which isn't a multiple of the \
                 validation batch size {vbs}"
            )));
        }

        Ok(())
    }

    pub fn producer_config(&self, config: &TrainingConfig) -> ProducerConfig {
        ProducerConfig {
            batch_size: config.batch_size,
            val_batch_size: config.val_batch_size,
            epochs: config.epochs,
            loader_jobs: config.loader_jobs,
            val_interval: config.val_interval,
            lr_decay: config.lr_decay,
            random_crop: config.random_crop,
            flip: config.flip,
            seed: config.seed,
        }
    }

    pub fn trainer_spec(
        &self,
        config: &TrainingConfig,
        learning_rate: LearningRate,
    ) -> TrainerSpec {
        TrainerSpec {
            arch: config.arch.clone(),
            joints: config.joints.get(),
            optimizer: config.optimizer.clone(),
            learning_rate,
            tolerance: config.tolerance,
            seed: config.seed,
        }
    }

    pub fn logger_config(&self, config: &TrainingConfig, val_size: usize) -> LoggerConfig {
        LoggerConfig {
            batch_size: config.batch_size,
            val_batch_size: config.val_batch_size,
            val_size,
            log_interval: config.log_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn config() -> TrainingConfig {
        TrainingConfig::new(
            PathBuf::from("train.csv"),
            PathBuf::from("val.csv"),
            PathBuf::from("mean"),
            PathBuf::from("model"),
        )
    }

    #[test]
    fn defaults_are_valid() {
        assert!(Adapter::new().validate(&config()).is_ok());
    }

    #[test]
    fn unknown_names_are_rejected() {
        let mut bad_arch = config();
        bad_arch.arch = "googlenet".into();
        assert!(matches!(
            Adapter::new().validate(&bad_arch),
            Err(OrchestratorError::InvalidConfig(_))
        ));

        let mut bad_optimizer = config();
        bad_optimizer.optimizer = "rmsprop".into();
        assert!(Adapter::new().validate(&bad_optimizer).is_err());
    }

    #[test]
    fn learning_rate_must_be_positive() {
        let mut bad = config();
        bad.lr = 0.;
        assert!(Adapter::new().validate(&bad).is_err());

        let mut bad = config();
        bad.lr_decay = f32::NAN;
        assert!(Adapter::new().validate(&bad).is_err());
    }

    #[test]
    fn validation_set_must_split_into_full_batches() {
        let adapter = Adapter::new();
        let config = config();

        assert!(adapter.validate_val_size(&config, 50_000).is_ok());
        assert!(adapter.validate_val_size(&config, 0).is_ok());
        assert!(matches!(
            adapter.validate_val_size(&config, 1_000 + 1),
            Err(OrchestratorError::InvalidConfig(_))
        ));
    }
}

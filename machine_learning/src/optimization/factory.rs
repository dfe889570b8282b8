use comms::LearningRate;

use super::{AdaGrad, Adam, GradientDescent, GradientDescentWithMomentum, Optimizer};
use crate::{MlErr, Result};

/// The names of the optimizers `build` knows about.
pub const OPTIMIZERS: [&str; 4] = ["adagrad", "sgd", "momentum", "adam"];

/// Builds an optimizer by name, with the usual hyperparameters.
///
/// # Arguments
/// * `name` - One of `OPTIMIZERS`.
/// * `len` - The amount of parameters it will update.
/// * `learning_rate` - The shared learning rate it reads on every update.
///
/// # Errors
/// `MlErr::UnknownOptimizer` if there's no optimizer with that name.
pub fn build(name: &str, len: usize, learning_rate: LearningRate) -> Result<Box<dyn Optimizer>> {
    let optimizer: Box<dyn Optimizer> = match name {
        "adagrad" => Box::new(AdaGrad::new(len, learning_rate, 1e-8)),
        "sgd" => Box::new(GradientDescent::new(learning_rate)),
        "momentum" => Box::new(GradientDescentWithMomentum::new(len, learning_rate, 0.9)),
        "adam" => Box::new(Adam::new(len, learning_rate, 0.9, 0.999, 1e-8)),
        _ => return Err(MlErr::UnknownOptimizer(name.to_string())),
    };

    Ok(optimizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_name_builds() {
        for name in OPTIMIZERS {
            assert!(build(name, 3, LearningRate::new(0.01)).is_ok(), "{name}");
        }
        assert!(matches!(
            build("rmsprop", 3, LearningRate::new(0.01)),
            Err(MlErr::UnknownOptimizer(_))
        ));
    }
}

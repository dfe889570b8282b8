use log::debug;
use rand::Rng;

use super::{Model, Sequential, SequentialBuilder};
use crate::{MlErr, Result};

/// The names of the architectures `build` knows about.
pub const ARCHITECTURES: [&str; 2] = ["deeppose", "tiny"];

const CHANNELS: usize = 3;

/// A freshly built network together with the data it needs.
pub struct Architecture {
    pub name: &'static str,
    pub insize: usize,
    pub model: Sequential,
    pub params: Vec<f32>,
}

/// Returns the side of the square input the named architecture expects.
///
/// # Errors
/// `MlErr::UnknownArch` if there's no architecture with that name.
pub fn insize(name: &str) -> Result<usize> {
    match name {
        "deeppose" => Ok(220),
        "tiny" => Ok(16),
        _ => Err(MlErr::UnknownArch(name.to_string())),
    }
}

/// Builds an architecture by name.
///
/// Every architecture regresses `2 * joints` coordinates through a unit sigmoid, so the targets
/// must be normalized to `[0, 1]`.
///
/// # Arguments
/// * `name` - One of `ARCHITECTURES`.
/// * `joints` - The amount of joints to regress.
/// * `rng` - The random number generator used to initialize the parameters.
///
/// # Errors
/// `MlErr::UnknownArch` for an unknown name, `MlErr::InvalidArch` if `joints` is zero.
pub fn build<R: Rng>(name: &str, joints: usize, rng: &mut R) -> Result<Architecture> {
    if joints == 0 {
        return Err(MlErr::InvalidArch("at least one joint is needed".into()));
    }

    let insize = insize(name)?;
    let input = (CHANNELS, insize, insize);
    let outputs = 2 * joints;

    let (name, (model, params)) = match name {
        "deeppose" => ("deeppose", deeppose(input, outputs, rng)?),
        _ => ("tiny", tiny(input, outputs, rng)?),
    };

    debug!(arch = name, params = model.size(); "built architecture");

    Ok(Architecture {
        name,
        insize,
        model,
        params,
    })
}

/// AlexNet-style regressor without the normalization and dropout layers.
fn deeppose<R: Rng>(
    input: (usize, usize, usize),
    outputs: usize,
    rng: &mut R,
) -> Result<(Sequential, Vec<f32>)> {
    let built = SequentialBuilder::new(input, rng)
        .conv(96, 11, 4, 0)?
        .relu()
        .max_pool(3, 2)?
        .conv(256, 5, 1, 2)?
        .relu()
        .max_pool(3, 2)?
        .conv(384, 3, 1, 1)?
        .relu()
        .conv(384, 3, 1, 1)?
        .relu()
        .conv(256, 3, 1, 1)?
        .relu()
        .max_pool(3, 2)?
        .flatten()
        .dense(4096)?
        .relu()
        .dense(4096)?
        .relu()
        .dense(outputs)?
        .sigmoid(1.)
        .build();

    Ok(built)
}

fn tiny<R: Rng>(
    input: (usize, usize, usize),
    outputs: usize,
    rng: &mut R,
) -> Result<(Sequential, Vec<f32>)> {
    let built = SequentialBuilder::new(input, rng)
        .conv(8, 3, 1, 1)?
        .relu()
        .max_pool(2, 2)?
        .conv(16, 3, 1, 1)?
        .relu()
        .max_pool(2, 2)?
        .flatten()
        .dense(64)?
        .relu()
        .dense(outputs)?
        .sigmoid(1.)
        .build();

    Ok(built)
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn unknown_names_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            build("googlenet", 14, &mut rng),
            Err(MlErr::UnknownArch(name)) if name == "googlenet"
        ));
        assert!(insize("nin").is_err());
    }

    #[test]
    fn tiny_regresses_two_coordinates_per_joint() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut arch = build("tiny", 3, &mut rng).unwrap();
        assert_eq!(arch.params.len(), arch.model.size());

        let x = Array4::<f32>::zeros((2, CHANNELS, arch.insize, arch.insize));
        let out = arch
            .model
            .forward(&arch.params, x.view().into_dyn(), false)
            .unwrap();

        assert_eq!(out.shape(), &[2, 6]);
        assert!(out.iter().all(|&y| (0. ..=1.).contains(&y)));
    }
}

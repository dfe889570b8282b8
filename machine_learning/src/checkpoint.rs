//! Tensor files in the safetensors format: model checkpoints and any other `f32` tensor the
//! pipeline persists.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use safetensors::{
    SafeTensors,
    tensor::{Dtype, TensorView},
};

use crate::{MlErr, Result};

const PARAMS: &str = "params";

/// A single `f32` tensor read from a file, with the file's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
    pub metadata: HashMap<String, String>,
}

/// Writes a single `f32` tensor to `path`.
///
/// The file is written next to `path` first and then renamed over it, so readers never see a
/// partially written file.
///
/// # Errors
/// If `shape` doesn't match the length of `data` or the file can't be written.
pub fn save_tensor(
    path: &Path,
    name: &str,
    shape: Vec<usize>,
    data: &[f32],
    metadata: HashMap<String, String>,
) -> Result<()> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(MlErr::SizeMismatch {
            what: "tensor data",
            got: data.len(),
            expected,
        });
    }

    let view = TensorView::new(Dtype::F32, shape, bytemuck::cast_slice(data))?;
    let tmp = temp_path(path);
    let metadata = (!metadata.is_empty()).then_some(metadata);

    safetensors::serialize_to_file([(name, &view)], &metadata, &tmp)?;
    fs::rename(&tmp, path)?;

    debug!(path:? = path, tensor = name; "tensor saved");
    Ok(())
}

/// Reads the `f32` tensor called `name` from `path`.
///
/// # Errors
/// If the file can't be read, isn't a valid safetensors file or doesn't hold an `f32` tensor
/// with that name.
pub fn load_tensor(path: &Path, name: &str) -> Result<Tensor> {
    let bytes = fs::read(path)?;
    let (_, header) = SafeTensors::read_metadata(&bytes)?;
    let st = SafeTensors::deserialize(&bytes)?;
    let view = st.tensor(name)?;

    if view.dtype() != Dtype::F32 {
        return Err(MlErr::InvalidTensor(format!(
            "{name} holds {:?} values, expected F32",
            view.dtype()
        )));
    }

    let data = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(Tensor {
        shape: view.shape().to_vec(),
        data,
        metadata: header.metadata().clone().unwrap_or_default(),
    })
}

/// What a checkpoint records about the network its parameters belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointMeta {
    pub arch: String,
    pub joints: usize,
    pub insize: usize,
}

/// A snapshot of a model's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub meta: CheckpointMeta,
    pub params: Vec<f32>,
}

impl Checkpoint {
    /// Writes the checkpoint to `path`, replacing any previous one.
    pub fn save(path: &Path, meta: &CheckpointMeta, params: &[f32]) -> Result<()> {
        let metadata = HashMap::from([
            ("arch".to_string(), meta.arch.clone()),
            ("joints".to_string(), meta.joints.to_string()),
            ("insize".to_string(), meta.insize.to_string()),
        ]);

        save_tensor(path, PARAMS, vec![params.len()], params, metadata)
    }

    /// Reads a checkpoint written by `Checkpoint::save`.
    pub fn load(path: &Path) -> Result<Self> {
        let Tensor { data, metadata, .. } = load_tensor(path, PARAMS)?;

        let field = |key: &str| {
            metadata
                .get(key)
                .cloned()
                .ok_or_else(|| MlErr::InvalidTensor(format!("the checkpoint has no {key:?} entry")))
        };
        let number = |key: &str| {
            field(key)?
                .parse::<usize>()
                .map_err(|e| MlErr::InvalidTensor(format!("bad {key:?} entry: {e}")))
        };

        let meta = CheckpointMeta {
            arch: field("arch")?,
            joints: number("joints")?,
            insize: number("insize")?,
        };

        Ok(Self { meta, params: data })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> CheckpointMeta {
        CheckpointMeta {
            arch: "tiny".into(),
            joints: 14,
            insize: 16,
        }
    }

    #[test]
    fn checkpoint_survives_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let params = vec![0.5, -1.25, 3.0];

        Checkpoint::save(&path, &meta(), &params).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();

        assert_eq!(loaded.meta, meta());
        assert_eq!(loaded.params, params);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn saving_again_replaces_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model");

        Checkpoint::save(&path, &meta(), &[1.0]).unwrap();
        Checkpoint::save(&path, &meta(), &[2.0, 3.0]).unwrap();

        assert_eq!(Checkpoint::load(&path).unwrap().params, [2.0, 3.0]);
    }

    #[test]
    fn tensor_shape_must_match_the_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mean");

        let result = save_tensor(&path, "mean", vec![2, 2], &[1.0; 3], HashMap::new());
        assert!(matches!(result, Err(MlErr::SizeMismatch { .. })));
    }

    #[test]
    fn missing_tensor_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mean");

        save_tensor(&path, "mean", vec![1, 2], &[1.0, 2.0], HashMap::new()).unwrap();
        assert!(load_tensor(&path, PARAMS).is_err());

        let tensor = load_tensor(&path, "mean").unwrap();
        assert_eq!(tensor.shape, [1, 2]);
        assert!(tensor.metadata.is_empty());
    }
}

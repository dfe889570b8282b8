use ndarray::{Array2, Array4};

use crate::{CommsErr, Result};

/// The phase a pipeline stage is in. Every `Data` message is interpreted according to the
/// last `Switch` received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Mode {
    #[serde(rename = "train")]
    Train,
    #[serde(rename = "val")]
    Validate,
}

/// The message flowing through every hand-off queue of the pipeline.
#[derive(Debug)]
pub enum Msg<T> {
    Data(T),
    Switch(Mode),
    End,
}

impl<T> Msg<T> {
    /// Returns a short name for this message's kind, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Data(_) => "data",
            Msg::Switch(Mode::Train) => "switch/train",
            Msg::Switch(Mode::Validate) => "switch/val",
            Msg::End => "end",
        }
    }
}

/// A fixed-size group of images (`N×C×H×W`) and their joint labels (`N×2J`).
#[derive(Debug, Clone)]
pub struct Batch {
    pub x: Array4<f32>,
    pub y: Array2<f32>,
}

impl Batch {
    /// Creates a new `Batch`.
    ///
    /// # Arguments
    /// * `x` - The images, one per row of the first axis.
    /// * `y` - The labels, one per row.
    ///
    /// # Returns
    /// A new `Batch` or an error if the amount of images and labels differ.
    pub fn new(x: Array4<f32>, y: Array2<f32>) -> Result<Self> {
        let (images, labels) = (x.len_of(ndarray::Axis(0)), y.nrows());
        if images != labels {
            return Err(CommsErr::BatchMismatch { images, labels });
        }

        Ok(Self { x, y })
    }

    /// Returns the amount of samples in this batch.
    pub fn len(&self) -> usize {
        self.y.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The outcome of one forward pass, detached from any computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub loss: f32,
    pub accuracy: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_rejects_mismatched_rows() {
        let x = Array4::zeros((2, 3, 4, 4));
        let y = Array2::zeros((3, 28));
        assert!(matches!(
            Batch::new(x, y),
            Err(CommsErr::BatchMismatch {
                images: 2,
                labels: 3
            })
        ));
    }

    #[test]
    fn msg_kinds() {
        assert_eq!(Msg::<()>::Switch(Mode::Validate).kind(), "switch/val");
        assert_eq!(Msg::Data(()).kind(), "data");
        assert_eq!(Msg::<()>::End.kind(), "end");
    }
}

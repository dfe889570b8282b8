use std::{error::Error, fmt};

/// The comms module's result type.
pub type Result<T> = std::result::Result<T, CommsErr>;

/// Failures crossing a stage boundary.
#[derive(Debug)]
pub enum CommsErr {
    /// The other end of the queue was dropped.
    Closed { side: &'static str },
    /// The image and label tensors of a batch disagree on the amount of samples.
    BatchMismatch { images: usize, labels: usize },
}

impl fmt::Display for CommsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommsErr::Closed { side } => write!(f, "hand-off queue closed on the {side} side"),
            CommsErr::BatchMismatch { images, labels } => {
                write!(f, "batch holds {images} images but {labels} labels")
            }
        }
    }
}

impl Error for CommsErr {}

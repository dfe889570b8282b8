//! Everything between the image files on disk and the batches the training engine consumes.

pub mod dataset;
pub mod error;
pub mod mean;
pub mod producer;
pub mod reader;

pub use dataset::{Dataset, Sample};
pub use error::{LoaderErr, Result};
pub use mean::MeanAccumulator;
pub use producer::{Producer, ProducerConfig, ProducerStats};
pub use reader::ImageReader;

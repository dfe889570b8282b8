mod adapter;
mod training;

pub use adapter::Adapter;
pub use training::TrainingConfig;

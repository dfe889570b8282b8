mod builder;
mod factory;
pub mod layers;
pub mod loss;
mod model;
mod sequential;

pub use builder::SequentialBuilder;
pub use factory::{ARCHITECTURES, Architecture, build, insize};
pub use model::Model;
pub use sequential::Sequential;

mod conv;
mod dense;
mod flatten;
mod layer;
mod max_pool;
mod relu;
mod sigmoid;

pub use conv::Conv2d;
pub use dense::Dense;
pub use flatten::Flatten;
pub use layer::Layer;
pub use max_pool::MaxPool2d;
pub use relu::Relu;
pub use sigmoid::Sigmoid;

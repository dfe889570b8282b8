mod adagrad;
mod adam;
mod factory;
mod gradient_descent;
mod gradient_descent_with_momentum;
mod optimizer;

pub use adagrad::AdaGrad;
pub use adam::Adam;
pub use factory::{OPTIMIZERS, build};
pub use gradient_descent::GradientDescent;
pub use gradient_descent_with_momentum::GradientDescentWithMomentum;
pub use optimizer::Optimizer;

pub use self::activation::Activation;
pub use self::config::TrainingConfig;
pub use self::gradient_descent::{Adam, GradientDescent, SimpleGradientDescent};
pub use self::layer::{Layer, LayerGradients};
pub use self::linear_algebra::{Matrix, MatrixError, Value, Vector};
pub use self::loss::Loss;
pub use self::network::{LayerSpec, Network, NetworkError, Topology};

pub mod activation;
pub mod linear_algebra;
pub mod loss;

mod config;
mod gradient_descent;
mod layer;
mod network;
mod persist;

//! Minimal neural-network building blocks with analytic gradients.

pub mod activation;
pub mod layer;
pub mod optimizer;

pub use activation::{sigmoid, softplus, Activation};
pub use layer::{DenseGrads, DenseLayer};
pub use optimizer::{Adam, StepLr};

//! NBEATSx: neural basis expansion analysis with exogenous variables.
//!
//! The network is a sequence of stacks, each made of blocks. A block reads the
//! current insample residuals together with the exogenous covariates, emits
//! basis coefficients, and returns a backcast (subtracted from the residuals)
//! and a partial forecast (summed into the output). Stacks differ only in
//! their basis: identity, polynomial trend, Fourier seasonality or the
//! future covariates themselves.

mod basis;
mod block;
mod config;
mod model;
mod network;

pub use basis::Basis;
pub use config::{NBEATSxConfig, StackType};
pub use model::NBEATSx;
pub use network::{ExogDims, Network};

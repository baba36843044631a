//! Forecasting models.

mod traits;

pub mod losses;
pub mod nbeatsx;
pub mod nn;

pub use losses::{Distribution, Loss};
pub use nbeatsx::{NBEATSx, NBEATSxConfig, StackType};
pub use traits::{BoxedForecaster, Forecaster, TrainingReport};

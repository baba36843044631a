//! # anofox-neuralforecast
//!
//! Neural panel forecasting in Rust.
//!
//! Provides an NBEATSx network (identity, trend, seasonality and exogenous
//! stacks) trained with hand-written backpropagation over `ndarray`, point,
//! multi-quantile and distributional losses with prediction intervals, a
//! `NeuralForecast` orchestrator over long-format panels with static and
//! future exogenous variables, and SVG plotting of forecasts with bands.

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_range_loop)]

pub mod core;
pub mod data;
pub mod error;
pub mod models;
pub mod neural_forecast;
pub mod plot;
pub mod transform;
pub mod utils;
pub mod workflow;

pub use crate::core::{Forecast, Frequency, PanelFrame, StaticFrame};
pub use error::{ForecastError, Result};
pub use neural_forecast::NeuralForecast;

pub mod prelude {
    pub use crate::core::{Forecast, Frequency, PanelFrame, StaticFrame};
    pub use crate::error::{ForecastError, Result};
    pub use crate::models::{Distribution, Forecaster, Loss, NBEATSx, NBEATSxConfig, StackType};
    pub use crate::neural_forecast::NeuralForecast;
    pub use crate::transform::ScalerType;
    pub use crate::utils::{calculate_metrics, evaluate_forecast, AccuracyMetrics};
}

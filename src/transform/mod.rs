//! Data transformations applied inside the training loop.
//!
//! # Example
//!
//! ```
//! use anofox_neuralforecast::transform::ScalerType;
//!
//! let window = vec![112.0, 118.0, 132.0, 129.0, 121.0];
//! let mask = vec![1.0; window.len()];
//! let stats = ScalerType::Robust.fit(&window, &mask);
//! let scaled: Vec<f64> = window.iter().map(|&x| stats.transform(x)).collect();
//! assert!((stats.inverse(scaled[0]) - 112.0).abs() < 1e-9);
//! ```

pub mod scale;

pub use scale::{scale_series, ScaleStats, ScalerType};

//! Forecaster trait defining the common interface for all neural models.

use crate::core::Forecast;
use crate::data::{ExogSpec, FutureExog, TimeSeriesDataset};
use crate::error::Result;
use crate::models::losses::Loss;
use serde::{Deserialize, Serialize};

/// Summary of one training run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Alias of the trained model.
    pub model: String,
    /// Optimizer steps actually taken.
    pub steps: usize,
    /// Training loss of every step.
    pub train_loss: Vec<f64>,
    /// `(step, loss)` of every validation check.
    pub valid_loss: Vec<(usize, f64)>,
    pub best_valid_loss: Option<f64>,
    pub early_stopped: bool,
}

impl TrainingReport {
    /// Mean training loss over the last `n` steps.
    pub fn recent_train_loss(&self, n: usize) -> Option<f64> {
        let n = n.min(self.train_loss.len());
        if n == 0 {
            return None;
        }
        let tail = &self.train_loss[self.train_loss.len() - n..];
        Some(tail.iter().sum::<f64>() / n as f64)
    }
}

/// Common interface for window-based forecasting models.
///
/// This trait is object-safe and can be used with `Box<dyn Forecaster>`.
pub trait Forecaster {
    /// Train on the windows of `dataset`, holding out the last `val_size`
    /// steps of every series for validation.
    fn fit(&mut self, dataset: &TimeSeriesDataset, val_size: usize) -> Result<TrainingReport>;

    /// Forecast `horizon()` steps past the end of every series, in dataset order.
    fn predict(&self, dataset: &TimeSeriesDataset, futr: &FutureExog) -> Result<Vec<Forecast>>;

    /// Get the model name.
    fn name(&self) -> &str;

    /// Name used for output columns.
    fn alias(&self) -> &str {
        self.name()
    }

    fn horizon(&self) -> usize;

    fn input_size(&self) -> usize;

    fn loss(&self) -> &Loss;

    /// Exogenous columns the model reads.
    fn exog_lists(&self) -> ExogSpec;

    /// Check if the model has been fitted.
    fn is_fitted(&self) -> bool;

    /// Prediction columns, in the order [`Forecast::to_columns`] emits them.
    fn output_columns(&self) -> Vec<String> {
        self.loss().output_columns(self.alias())
    }
}

/// Type alias for boxed forecaster trait objects.
///
/// # Example
///
/// ```
/// use anofox_neuralforecast::models::{BoxedForecaster, Forecaster, NBEATSx, NBEATSxConfig};
///
/// let model: BoxedForecaster = Box::new(NBEATSx::new(NBEATSxConfig::new(12, 24)).unwrap());
/// assert_eq!(model.name(), "NBEATSx");
/// assert!(!model.is_fitted());
/// ```
pub type BoxedForecaster = Box<dyn Forecaster>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_loss_averages_tail() {
        let report = TrainingReport {
            train_loss: vec![4.0, 3.0, 2.0, 1.0],
            ..Default::default()
        };
        assert_eq!(report.recent_train_loss(2), Some(1.5));
        assert_eq!(report.recent_train_loss(10), Some(2.5));
        assert_eq!(TrainingReport::default().recent_train_loss(3), None);
    }
}

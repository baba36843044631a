//! Accuracy and calibration metrics for forecast evaluation.

use crate::core::Forecast;
use crate::error::{ForecastError, Result};
use serde::Serialize;

/// Point accuracy of a forecast against held-out values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error (None if zeros in actual)
    pub mape: Option<f64>,
    /// Symmetric Mean Absolute Percentage Error, in percent
    pub smape: f64,
}

/// Empirical coverage of one prediction interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalCoverage {
    /// Nominal level in percent.
    pub level: f64,
    /// Share of actual values inside `[lower, upper]`.
    pub coverage: f64,
    /// Mean of `upper - lower`.
    pub mean_width: f64,
}

/// Accuracy of the point path plus coverage of every interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastEvaluation {
    pub accuracy: AccuracyMetrics,
    pub coverage: Vec<IntervalCoverage>,
}

fn check_lengths(actual: &[f64], other: &[f64]) -> Result<()> {
    if actual.is_empty() || other.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if actual.len() != other.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: actual.len(),
            got: other.len(),
        });
    }
    Ok(())
}

/// Calculate accuracy metrics between actual and predicted values.
pub fn calculate_metrics(actual: &[f64], predicted: &[f64]) -> Result<AccuracyMetrics> {
    check_lengths(actual, predicted)?;
    let n = actual.len() as f64;
    let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;

    let mape = if actual.contains(&0.0) {
        None
    } else {
        let sum: f64 = errors.iter().zip(actual).map(|(e, a)| (e / a).abs()).sum();
        Some(100.0 * sum / n)
    };

    Ok(AccuracyMetrics {
        mae,
        mse,
        rmse: mse.sqrt(),
        mape,
        smape: smape(actual, predicted),
    })
}

/// Symmetric MAPE in percent; pairs of zeros count as perfect.
pub fn smape(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    let n = actual.len() as f64;
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| {
            let denom = a.abs() + p.abs();
            if denom == 0.0 {
                0.0
            } else {
                2.0 * (a - p).abs() / denom
            }
        })
        .sum::<f64>()
        * 100.0
        / n
}

/// Share of `actual` values that fall inside `[lower, upper]`.
pub fn interval_coverage(actual: &[f64], lower: &[f64], upper: &[f64]) -> Result<f64> {
    check_lengths(actual, lower)?;
    check_lengths(actual, upper)?;
    let inside = actual
        .iter()
        .zip(lower.iter().zip(upper))
        .filter(|(a, (lo, hi))| *lo <= *a && *a <= *hi)
        .count();
    Ok(inside as f64 / actual.len() as f64)
}

/// Evaluate the point path and every interval of a forecast.
pub fn evaluate_forecast(actual: &[f64], forecast: &Forecast) -> Result<ForecastEvaluation> {
    let accuracy = calculate_metrics(actual, forecast.primary())?;
    let coverage = forecast
        .intervals()
        .iter()
        .map(|i| {
            let width = i.upper.iter().zip(&i.lower).map(|(u, l)| u - l).sum::<f64>()
                / i.upper.len() as f64;
            Ok(IntervalCoverage {
                level: i.level,
                coverage: interval_coverage(actual, &i.lower, &i.upper)?,
                mean_width: width,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ForecastEvaluation { accuracy, coverage })
}

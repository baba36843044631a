//! Utility functions for forecast evaluation.

pub mod metrics;

pub use metrics::{
    calculate_metrics, evaluate_forecast, interval_coverage, smape, AccuracyMetrics,
    ForecastEvaluation, IntervalCoverage,
};

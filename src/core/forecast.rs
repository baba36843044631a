//! Forecast result structure for holding probabilistic predictions of one series.

use crate::error::{ForecastError, Result};

/// Lower and upper bounds of a central prediction interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionInterval {
    /// Confidence level in percent, e.g. `90.0`.
    pub level: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// A forecast containing a point prediction, an optional median and
/// any number of prediction intervals.
#[derive(Debug, Clone, Default)]
pub struct Forecast {
    /// Point predictions (the mean for distributional models).
    point: Vec<f64>,
    median: Option<Vec<f64>>,
    /// Intervals sorted by ascending level.
    intervals: Vec<PredictionInterval>,
}

/// Format a level the way output columns spell it (`80`, `97.5`).
pub fn format_level(level: f64) -> String {
    if level.fract() == 0.0 {
        format!("{}", level as i64)
    } else {
        format!("{}", level)
    }
}

impl Forecast {
    /// Create an empty forecast.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a forecast from point predictions.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            point: values,
            median: None,
            intervals: Vec::new(),
        }
    }

    /// Attach the median path.
    pub fn with_median(mut self, median: Vec<f64>) -> Result<Self> {
        self.check_len(median.len())?;
        self.median = Some(median);
        Ok(self)
    }

    /// Attach (or replace) the interval for `level`.
    pub fn with_interval(mut self, level: f64, lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if !(level > 0.0 && level < 100.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "interval level must lie in (0, 100), got {}",
                level
            )));
        }
        self.check_len(lower.len())?;
        self.check_len(upper.len())?;
        self.intervals.retain(|i| i.level != level);
        self.intervals.push(PredictionInterval {
            level,
            lower,
            upper,
        });
        self.intervals
            .sort_by(|a, b| a.level.partial_cmp(&b.level).unwrap_or(std::cmp::Ordering::Equal));
        Ok(self)
    }

    fn check_len(&self, got: usize) -> Result<()> {
        if got != self.point.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.point.len(),
                got,
            });
        }
        Ok(())
    }

    /// Get the forecast horizon (number of steps).
    pub fn horizon(&self) -> usize {
        self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point.is_empty()
    }

    /// Point predictions.
    pub fn primary(&self) -> &[f64] {
        &self.point
    }

    pub fn median(&self) -> Option<&[f64]> {
        self.median.as_deref()
    }

    pub fn has_intervals(&self) -> bool {
        !self.intervals.is_empty()
    }

    pub fn intervals(&self) -> &[PredictionInterval] {
        &self.intervals
    }

    /// The interval for a given level, if present.
    pub fn interval(&self, level: f64) -> Option<&PredictionInterval> {
        self.intervals.iter().find(|i| i.level == level)
    }

    /// Levels available, ascending.
    pub fn levels(&self) -> Vec<f64> {
        self.intervals.iter().map(|i| i.level).collect()
    }

    /// Output columns for a model alias.
    ///
    /// Order: `alias`, `alias-median`, `alias-lo-{l}` for descending levels,
    /// then `alias-hi-{l}` for ascending levels.
    pub fn to_columns(&self, alias: &str) -> Vec<(String, Vec<f64>)> {
        let mut cols = vec![(alias.to_string(), self.point.clone())];
        if let Some(median) = &self.median {
            cols.push((format!("{}-median", alias), median.clone()));
        }
        for interval in self.intervals.iter().rev() {
            cols.push((
                format!("{}-lo-{}", alias, format_level(interval.level)),
                interval.lower.clone(),
            ));
        }
        for interval in &self.intervals {
            cols.push((
                format!("{}-hi-{}", alias, format_level(interval.level)),
                interval.upper.clone(),
            ));
        }
        cols
    }
}

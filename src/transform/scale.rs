//! Temporal scalers applied to every training window.
//!
//! Statistics are computed from the observed insample part of a window only,
//! then applied to the whole window. Model outputs are mapped back with
//! [`ScaleStats::inverse`].

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

const DEGENERATE: f64 = 1e-10;

/// How windows are normalized before entering the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerType {
    /// No scaling.
    #[default]
    Identity,
    /// (x - mean) / std
    Standard,
    /// (x - median) / MAD
    ///
    /// Falls back to the standard deviation when the MAD is zero.
    Robust,
    /// Maps the insample range to [0, 1].
    MinMax,
    /// Maps the insample range to [-1, 1].
    MinMax1,
}

impl ScalerType {
    /// Parse a scaler name (`identity`, `standard`, `robust`, `minmax`, `minmax1`).
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "identity" | "none" => Ok(ScalerType::Identity),
            "standard" => Ok(ScalerType::Standard),
            "robust" => Ok(ScalerType::Robust),
            "minmax" => Ok(ScalerType::MinMax),
            "minmax1" => Ok(ScalerType::MinMax1),
            other => Err(ForecastError::InvalidParameter(format!(
                "unknown scaler type '{}'",
                other
            ))),
        }
    }

    /// Compute statistics from the positions where `mask` is positive.
    ///
    /// An empty or all-masked window yields the identity statistics.
    pub fn fit(&self, values: &[f64], mask: &[f64]) -> ScaleStats {
        let observed: Vec<f64> = values
            .iter()
            .zip(mask)
            .filter(|(v, m)| **m > 0.0 && v.is_finite())
            .map(|(v, _)| *v)
            .collect();
        if observed.is_empty() {
            return ScaleStats::IDENTITY;
        }

        match self {
            ScalerType::Identity => ScaleStats::IDENTITY,
            ScalerType::Standard => {
                let mean = mean(&observed);
                ScaleStats::new(mean, population_std(&observed, mean))
            }
            ScalerType::Robust => {
                let median = compute_median(&observed);
                let deviations: Vec<f64> = observed.iter().map(|x| (x - median).abs()).collect();
                let mut mad = compute_median(&deviations);
                if mad < DEGENERATE {
                    mad = population_std(&observed, mean(&observed));
                }
                ScaleStats::new(median, mad)
            }
            ScalerType::MinMax => {
                let (min, max) = min_max(&observed);
                ScaleStats::new(min, max - min)
            }
            ScalerType::MinMax1 => {
                let (min, max) = min_max(&observed);
                ScaleStats::new((max + min) / 2.0, (max - min) / 2.0)
            }
        }
    }
}

/// Location and spread of one window channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleStats {
    pub center: f64,
    pub scale: f64,
}

impl ScaleStats {
    pub const IDENTITY: ScaleStats = ScaleStats {
        center: 0.0,
        scale: 1.0,
    };

    /// Build statistics; a degenerate spread becomes 1.
    pub fn new(center: f64, scale: f64) -> Self {
        let scale = if scale.is_finite() && scale > DEGENERATE {
            scale
        } else {
            1.0
        };
        Self { center, scale }
    }

    pub fn transform(&self, x: f64) -> f64 {
        (x - self.center) / self.scale
    }

    pub fn inverse(&self, x: f64) -> f64 {
        x * self.scale + self.center
    }

    /// Map a spread (standard deviation, scale parameter) back to data units.
    pub fn inverse_spread(&self, s: f64) -> f64 {
        s * self.scale
    }
}

/// Scale a whole series with one set of statistics.
pub fn scale_series(values: &[f64], scaler: ScalerType) -> (Vec<f64>, ScaleStats) {
    let mask = vec![1.0; values.len()];
    let stats = scaler.fit(values, &mask);
    (values.iter().map(|&x| stats.transform(x)).collect(), stats)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn min_max(values: &[f64]) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (min, max)
}

/// Median of a slice, `NaN` when empty.
pub(crate) fn compute_median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

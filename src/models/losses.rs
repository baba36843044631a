//! Training losses and the mapping from network outputs to forecasts.
//!
//! A network emits `n_outputs` arrays of shape `[batch, h]`. Point losses use a
//! single output; [`Loss::MQLoss`] emits one output per quantile;
//! [`Loss::DistributionLoss`] emits the raw parameters of a distribution.
//! All losses are evaluated in the scaled space of the window.

use crate::core::{format_level, Forecast};
use crate::error::{ForecastError, Result};
use crate::models::nn::{sigmoid, softplus};
use crate::transform::ScaleStats;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use statrs::function::gamma::{digamma, ln_gamma};

/// Lower bound added to every predicted scale.
const MIN_SCALE: f64 = 1e-3;
/// Degrees of freedom are `MIN_DF + softplus(raw)`.
const MIN_DF: f64 = 2.0;
const HALF_LN_2PI: f64 = 0.918_938_533_204_672_8;

/// Parametric output distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    Normal,
    StudentT,
}

impl Distribution {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "Normal" | "normal" => Ok(Distribution::Normal),
            "StudentT" | "studentt" => Ok(Distribution::StudentT),
            other => Err(ForecastError::InvalidParameter(format!(
                "unsupported distribution '{}'",
                other
            ))),
        }
    }

    /// Number of raw parameters the network must emit.
    pub fn n_params(&self) -> usize {
        match self {
            Distribution::Normal => 2,
            Distribution::StudentT => 3,
        }
    }
}

/// Training objective.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Loss {
    /// Mean absolute error.
    #[default]
    Mae,
    /// Mean squared error.
    Mse,
    /// Multi-quantile (pinball) loss over the median and the level bounds.
    MQLoss { levels: Vec<f64> },
    /// Negative log-likelihood of a parametric distribution.
    DistributionLoss {
        distribution: Distribution,
        levels: Vec<f64>,
    },
}

impl Loss {
    pub fn distribution(distribution: Distribution, levels: Vec<f64>) -> Self {
        Loss::DistributionLoss {
            distribution,
            levels,
        }
    }

    pub fn mq(levels: Vec<f64>) -> Self {
        Loss::MQLoss { levels }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Loss::Mae => "MAE",
            Loss::Mse => "MSE",
            Loss::MQLoss { .. } => "MQLoss",
            Loss::DistributionLoss { .. } => "DistributionLoss",
        }
    }

    /// `true` for losses that only produce a single point forecast.
    pub fn is_point(&self) -> bool {
        matches!(self, Loss::Mae | Loss::Mse)
    }

    /// Interval levels in percent, as configured.
    pub fn levels(&self) -> &[f64] {
        match self {
            Loss::Mae | Loss::Mse => &[],
            Loss::MQLoss { levels } | Loss::DistributionLoss { levels, .. } => levels,
        }
    }

    pub fn n_outputs(&self) -> usize {
        match self {
            Loss::Mae | Loss::Mse => 1,
            Loss::MQLoss { levels } => 1 + 2 * levels.len(),
            Loss::DistributionLoss { distribution, .. } => distribution.n_params(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let levels = self.levels();
        for (i, &l) in levels.iter().enumerate() {
            if !(l > 0.0 && l < 100.0) {
                return Err(ForecastError::InvalidParameter(format!(
                    "levels must lie in (0, 100), got {}",
                    l
                )));
            }
            if levels[..i].contains(&l) {
                return Err(ForecastError::InvalidParameter(format!(
                    "duplicate level {}",
                    l
                )));
            }
        }
        Ok(())
    }

    /// Levels sorted ascending.
    fn sorted_levels(&self) -> Vec<f64> {
        let mut levels = self.levels().to_vec();
        levels.sort_by(|a, b| a.total_cmp(b));
        levels
    }

    /// Quantiles emitted by [`Loss::MQLoss`], ascending:
    /// `0.5 - l/200` for descending `l`, the median, then `0.5 + l/200`.
    pub fn quantiles(&self) -> Vec<f64> {
        let levels = self.sorted_levels();
        let mut q: Vec<f64> = levels.iter().rev().map(|l| 0.5 - l / 200.0).collect();
        q.push(0.5);
        q.extend(levels.iter().map(|l| 0.5 + l / 200.0));
        q
    }

    /// Output column names for a model alias.
    pub fn output_columns(&self, alias: &str) -> Vec<String> {
        let mut cols = vec![alias.to_string()];
        if self.is_point() {
            return cols;
        }
        cols.push(format!("{}-median", alias));
        let levels = self.sorted_levels();
        for l in levels.iter().rev() {
            cols.push(format!("{}-lo-{}", alias, format_level(*l)));
        }
        for l in &levels {
            cols.push(format!("{}-hi-{}", alias, format_level(*l)));
        }
        cols
    }

    /// Mean loss over the observed target steps and its gradient with
    /// respect to every raw output.
    pub fn loss_and_grad(
        &self,
        outputs: &[Array2<f64>],
        target: &Array2<f64>,
        mask: &Array2<f64>,
    ) -> Result<(f64, Vec<Array2<f64>>)> {
        if outputs.len() != self.n_outputs() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.n_outputs(),
                got: outputs.len(),
            });
        }
        for out in outputs {
            if out.dim() != target.dim() {
                return Err(ForecastError::DimensionMismatch {
                    expected: target.len(),
                    got: out.len(),
                });
            }
        }
        let denom = mask.sum().max(1.0);
        let dim = target.dim();

        match self {
            Loss::Mae => {
                let mut grad = Array2::zeros(dim);
                let mut total = 0.0;
                for ((i, j), &m) in mask.indexed_iter() {
                    if m > 0.0 {
                        let e = outputs[0][[i, j]] - target[[i, j]];
                        total += e.abs() * m;
                        grad[[i, j]] = e.signum() * m / denom;
                    }
                }
                Ok((total / denom, vec![grad]))
            }
            Loss::Mse => {
                let mut grad = Array2::zeros(dim);
                let mut total = 0.0;
                for ((i, j), &m) in mask.indexed_iter() {
                    if m > 0.0 {
                        let e = outputs[0][[i, j]] - target[[i, j]];
                        total += e * e * m;
                        grad[[i, j]] = 2.0 * e * m / denom;
                    }
                }
                Ok((total / denom, vec![grad]))
            }
            Loss::MQLoss { .. } => {
                let quantiles = self.quantiles();
                let nq = quantiles.len() as f64;
                let mut grads = vec![Array2::zeros(dim); quantiles.len()];
                let mut total = 0.0;
                for (k, &q) in quantiles.iter().enumerate() {
                    for ((i, j), &m) in mask.indexed_iter() {
                        if m > 0.0 {
                            let e = target[[i, j]] - outputs[k][[i, j]];
                            total += (q * e).max((q - 1.0) * e) * m;
                            let d = if e > 0.0 {
                                -q
                            } else if e < 0.0 {
                                1.0 - q
                            } else {
                                0.0
                            };
                            grads[k][[i, j]] = d * m / (denom * nq);
                        }
                    }
                }
                Ok((total / (denom * nq), grads))
            }
            Loss::DistributionLoss { distribution, .. } => {
                let mut grads = vec![Array2::zeros(dim); distribution.n_params()];
                let mut total = 0.0;
                for ((i, j), &m) in mask.indexed_iter() {
                    if m <= 0.0 {
                        continue;
                    }
                    let y = target[[i, j]];
                    let loc = outputs[0][[i, j]];
                    let raw_scale = outputs[1][[i, j]];
                    let sigma = softplus(raw_scale) + MIN_SCALE;
                    let dsigma_draw = sigmoid(raw_scale);
                    let z = (y - loc) / sigma;

                    match distribution {
                        Distribution::Normal => {
                            total += (HALF_LN_2PI + sigma.ln() + 0.5 * z * z) * m;
                            grads[0][[i, j]] = -z / sigma * m / denom;
                            grads[1][[i, j]] = (1.0 - z * z) / sigma * dsigma_draw * m / denom;
                        }
                        Distribution::StudentT => {
                            let raw_df = outputs[2][[i, j]];
                            let nu = MIN_DF + softplus(raw_df);
                            let z2 = z * z;
                            let nll = -ln_gamma((nu + 1.0) / 2.0)
                                + ln_gamma(nu / 2.0)
                                + 0.5 * (nu * std::f64::consts::PI).ln()
                                + sigma.ln()
                                + (nu + 1.0) / 2.0 * (z2 / nu).ln_1p();
                            total += nll * m;

                            let dloc = -(nu + 1.0) * z / (sigma * (nu + z2));
                            let dsigma = 1.0 / sigma - (nu + 1.0) * z2 / (sigma * (nu + z2));
                            let dnu = 0.5
                                * (digamma(nu / 2.0) - digamma((nu + 1.0) / 2.0) + 1.0 / nu
                                    + (z2 / nu).ln_1p()
                                    - (nu + 1.0) * z2 / (nu * (nu + z2)));
                            grads[0][[i, j]] = dloc * m / denom;
                            grads[1][[i, j]] = dsigma * dsigma_draw * m / denom;
                            grads[2][[i, j]] = dnu * sigmoid(raw_df) * m / denom;
                        }
                    }
                }
                Ok((total / denom, grads))
            }
        }
    }

    /// Point forecast in scaled space: the output itself, the median
    /// quantile, or the distribution location.
    pub fn point(&self, outputs: &[Array2<f64>]) -> Result<Array2<f64>> {
        let idx = match self {
            Loss::MQLoss { levels } => levels.len(),
            _ => 0,
        };
        outputs
            .get(idx)
            .cloned()
            .ok_or(ForecastError::IndexOutOfBounds {
                index: idx,
                size: outputs.len(),
            })
    }

    /// Build the forecast of batch row `row`, mapped back to data units.
    pub fn forecast_row(
        &self,
        outputs: &[Array2<f64>],
        row: usize,
        stats: ScaleStats,
    ) -> Result<Forecast> {
        if outputs.len() != self.n_outputs() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.n_outputs(),
                got: outputs.len(),
            });
        }
        if row >= outputs[0].nrows() {
            return Err(ForecastError::IndexOutOfBounds {
                index: row,
                size: outputs[0].nrows(),
            });
        }
        let h = outputs[0].ncols();
        let at = |k: usize, t: usize| outputs[k][[row, t]];

        match self {
            Loss::Mae | Loss::Mse => Ok(Forecast::from_values(
                (0..h).map(|t| stats.inverse(at(0, t))).collect(),
            )),
            Loss::MQLoss { .. } => {
                let levels = self.sorted_levels();
                let n = levels.len();
                let mut paths = vec![vec![0.0; h]; 2 * n + 1];
                for t in 0..h {
                    let mut values: Vec<f64> = (0..=2 * n).map(|k| at(k, t)).collect();
                    values.sort_by(|a, b| a.total_cmp(b));
                    for (k, v) in values.into_iter().enumerate() {
                        paths[k][t] = stats.inverse(v);
                    }
                }
                let median = paths[n].clone();
                let mut forecast = Forecast::from_values(median.clone()).with_median(median)?;
                for (i, &level) in levels.iter().enumerate() {
                    // level i (ascending) sits at n-1-i below and n+1+i above the median
                    forecast = forecast.with_interval(
                        level,
                        paths[n - 1 - i].clone(),
                        paths[n + 1 + i].clone(),
                    )?;
                }
                Ok(forecast)
            }
            Loss::DistributionLoss { distribution, .. } => {
                let loc: Vec<f64> = (0..h).map(|t| at(0, t)).collect();
                let sigma: Vec<f64> = (0..h).map(|t| softplus(at(1, t)) + MIN_SCALE).collect();
                let point: Vec<f64> = loc.iter().map(|&v| stats.inverse(v)).collect();
                let mut forecast = Forecast::from_values(point.clone()).with_median(point)?;

                for level in self.sorted_levels() {
                    let p = 0.5 + level / 200.0;
                    let mut lower = Vec::with_capacity(h);
                    let mut upper = Vec::with_capacity(h);
                    for t in 0..h {
                        let z = match distribution {
                            Distribution::Normal => standard_normal()?.inverse_cdf(p),
                            Distribution::StudentT => {
                                let nu = MIN_DF + softplus(at(2, t));
                                StudentsT::new(0.0, 1.0, nu)
                                    .map_err(|e| ForecastError::ComputationError(e.to_string()))?
                                    .inverse_cdf(p)
                            }
                        };
                        lower.push(stats.inverse(loc[t] - z * sigma[t]));
                        upper.push(stats.inverse(loc[t] + z * sigma[t]));
                    }
                    forecast = forecast.with_interval(level, lower, upper)?;
                }
                Ok(forecast)
            }
        }
    }
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| ForecastError::ComputationError(e.to_string()))
}

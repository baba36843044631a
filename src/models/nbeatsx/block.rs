//! One NBEATSx block: an MLP that emits basis coefficients.

use super::basis::Basis;
use crate::data::Batch;
use crate::error::{ForecastError, Result};
use crate::models::nn::{Activation, DenseGrads, DenseLayer};
use ndarray::{concatenate, s, Array2, Array3, Axis};
use rand::Rng;

/// Block parameters.
///
/// `layers[0]` projects the input to the first hidden width, every following
/// hidden layer is `Linear → activation → dropout`, and the last layer emits
/// `theta = [theta_b | theta_f(output 0) | theta_f(output 1) | ...]`.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) layers: Vec<DenseLayer>,
    basis: Basis,
    n_outputs: usize,
}

/// Activations kept from a forward pass for backpropagation.
#[derive(Debug, Clone)]
pub struct BlockCache {
    inputs: Vec<Array2<f64>>,
    pre_activations: Vec<Array2<f64>>,
    dropout: Vec<Option<Array2<f64>>>,
}

/// Covariate templates of an exogenous basis for the current batch.
#[derive(Debug, Clone)]
pub struct ExogTemplates {
    pub backcast: Array3<f64>,
    pub forecast: Array3<f64>,
}

impl Block {
    pub fn new<R: Rng>(
        input_dim: usize,
        mlp_units: &[[usize; 2]],
        basis: Basis,
        n_outputs: usize,
        rng: &mut R,
    ) -> Self {
        let n_theta = basis.backcast_size() + n_outputs * basis.forecast_size();
        let mut layers = Vec::with_capacity(mlp_units.len() + 2);
        let first = mlp_units.first().map(|u| u[0]).unwrap_or(input_dim);
        layers.push(DenseLayer::new(input_dim, first, rng));
        for units in mlp_units {
            layers.push(DenseLayer::new(units[0], units[1], rng));
        }
        let last = mlp_units.last().map(|u| u[1]).unwrap_or(first);
        layers.push(DenseLayer::new(last, n_theta, rng));
        Self {
            layers,
            basis,
            n_outputs,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map(|l| l.input_size()).unwrap_or(0)
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.num_parameters()).sum()
    }

    fn hidden_range(&self) -> std::ops::Range<usize> {
        1..self.layers.len() - 1
    }

    /// Run the block. Dropout is applied only when `rng` is given.
    pub fn forward<R: Rng>(
        &self,
        input: Array2<f64>,
        activation: Activation,
        dropout: f64,
        mut rng: Option<&mut R>,
        exog: Option<&ExogTemplates>,
    ) -> Result<(Array2<f64>, Vec<Array2<f64>>, BlockCache)> {
        if input.ncols() != self.input_dim() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.input_dim(),
                got: input.ncols(),
            });
        }
        let mut cache = BlockCache {
            inputs: Vec::with_capacity(self.layers.len()),
            pre_activations: Vec::new(),
            dropout: Vec::new(),
        };

        let mut hidden = self.layers[0].forward(&input);
        cache.inputs.push(input);
        for i in self.hidden_range() {
            let z = self.layers[i].forward(&hidden);
            let mut a = z.mapv(|v| activation.forward(v));
            let mask = match rng.as_deref_mut() {
                Some(rng) if dropout > 0.0 => {
                    let keep = 1.0 / (1.0 - dropout);
                    let mask = Array2::from_shape_fn(a.dim(), |_| {
                        if rng.gen::<f64>() < dropout {
                            0.0
                        } else {
                            keep
                        }
                    });
                    a *= &mask;
                    Some(mask)
                }
                _ => None,
            };
            cache.inputs.push(hidden);
            cache.pre_activations.push(z);
            cache.dropout.push(mask);
            hidden = a;
        }
        let theta = self.layers[self.layers.len() - 1].forward(&hidden);
        cache.inputs.push(hidden);

        let (back_exog, fore_exog) = self.templates(exog)?;
        let p_b = self.basis.backcast_size();
        let p_f = self.basis.forecast_size();
        let backcast = self
            .basis
            .expand(&theta.slice(s![.., ..p_b]).to_owned(), true, &back_exog);
        let forecasts = (0..self.n_outputs)
            .map(|k| {
                let start = p_b + k * p_f;
                self.basis.expand(
                    &theta.slice(s![.., start..start + p_f]).to_owned(),
                    false,
                    &fore_exog,
                )
            })
            .collect();

        Ok((backcast, forecasts, cache))
    }

    /// Gradients of all layers and of the block input.
    pub fn backward(
        &self,
        cache: &BlockCache,
        grad_backcast: &Array2<f64>,
        grad_forecasts: &[Array2<f64>],
        activation: Activation,
        exog: Option<&ExogTemplates>,
    ) -> Result<(Array2<f64>, Vec<DenseGrads>)> {
        if grad_forecasts.len() != self.n_outputs {
            return Err(ForecastError::DimensionMismatch {
                expected: self.n_outputs,
                got: grad_forecasts.len(),
            });
        }
        let (back_exog, fore_exog) = self.templates(exog)?;
        let mut parts = vec![self.basis.theta_grad(grad_backcast, true, &back_exog)];
        for g in grad_forecasts {
            parts.push(self.basis.theta_grad(g, false, &fore_exog));
        }
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        let grad_theta = concatenate(Axis(1), &views)
            .map_err(|e| ForecastError::ComputationError(e.to_string()))?;

        let n = self.layers.len();
        let mut grads: Vec<Option<DenseGrads>> = vec![None; n];
        let (mut grad, last) = self.layers[n - 1].backward(&cache.inputs[n - 1], &grad_theta);
        grads[n - 1] = Some(last);

        for i in self.hidden_range().rev() {
            let j = i - 1;
            if let Some(mask) = &cache.dropout[j] {
                grad *= mask;
            }
            grad.zip_mut_with(&cache.pre_activations[j], |g, &z| *g *= activation.derivative(z));
            let (g, layer_grads) = self.layers[i].backward(&cache.inputs[i], &grad);
            grads[i] = Some(layer_grads);
            grad = g;
        }

        let (grad_input, first) = self.layers[0].backward(&cache.inputs[0], &grad);
        grads[0] = Some(first);

        let grads = grads
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ForecastError::ComputationError("missing layer gradient".to_string()))?;
        Ok((grad_input, grads))
    }

    fn templates(&self, exog: Option<&ExogTemplates>) -> Result<(Array3<f64>, Array3<f64>)> {
        match (&self.basis, exog) {
            (Basis::Fixed { .. }, _) => Ok((Array3::zeros((0, 0, 0)), Array3::zeros((0, 0, 0)))),
            (Basis::Exogenous { .. }, Some(t)) => Ok((t.backcast.clone(), t.forecast.clone())),
            (Basis::Exogenous { .. }, None) => Err(ForecastError::InvalidParameter(
                "exogenous basis needs future covariates".to_string(),
            )),
        }
    }
}

/// MLP input of a block: the residuals followed by the flattened
/// historic, future and static covariates of the batch.
pub fn block_input(residuals: &Array2<f64>, batch: &Batch) -> Result<Array2<f64>> {
    let hist = flatten(&batch.hist_exog);
    let futr = flatten(&batch.futr_exog);
    concatenate(
        Axis(1),
        &[
            residuals.view(),
            hist.view(),
            futr.view(),
            batch.stat_exog.view(),
        ],
    )
    .map_err(|e| ForecastError::ComputationError(e.to_string()))
}

/// `[B, T, C] → [B, T*C]`, time-major.
fn flatten(x: &Array3<f64>) -> Array2<f64> {
    let (b, t, c) = x.dim();
    Array2::from_shape_fn((b, t * c), |(i, j)| x[[i, j / c, j % c]])
}

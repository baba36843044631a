//! Stacks of blocks with doubly residual connections.

use super::basis::{exog_templates, Basis};
use super::block::{block_input, Block, BlockCache, ExogTemplates};
use super::config::{NBEATSxConfig, StackType};
use crate::data::Batch;
use crate::error::{ForecastError, Result};
use crate::models::nn::{Activation, DenseGrads, DenseLayer};
use ndarray::{s, Array2};
use rand::Rng;

/// Widths of the covariate channels a network is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExogDims {
    pub hist: usize,
    pub futr: usize,
    pub stat: usize,
}

/// The NBEATSx network.
///
/// `schedule[i]` is the parameter block applied at position `i`; with shared
/// weights every position of a stack maps to the stack's first block.
#[derive(Debug, Clone)]
pub struct Network {
    blocks: Vec<Block>,
    schedule: Vec<usize>,
    activation: Activation,
    dropout: f64,
    input_size: usize,
    h: usize,
    n_outputs: usize,
    uses_exog_basis: bool,
}

/// Everything backpropagation needs from a forward pass.
#[derive(Debug, Clone)]
pub struct NetworkCache {
    mask: Array2<f64>,
    blocks: Vec<BlockCache>,
    exog: Option<ExogTemplates>,
}

impl Network {
    pub fn new<R: Rng>(
        config: &NBEATSxConfig,
        dims: ExogDims,
        n_outputs: usize,
        rng: &mut R,
    ) -> Self {
        let l = config.input_size;
        let h = config.h;
        let input_dim = l + l * dims.hist + (l + h) * dims.futr + dims.stat;

        let mut blocks = Vec::new();
        let mut schedule = Vec::new();
        for (&stack, &n_blocks) in config.stack_types.iter().zip(&config.n_blocks) {
            for b in 0..n_blocks {
                if config.shared_weights && b > 0 {
                    schedule.push(blocks.len() - 1);
                    continue;
                }
                let basis = Basis::new(
                    stack,
                    l,
                    h,
                    config.n_polynomials,
                    config.n_harmonics,
                    dims.futr,
                );
                blocks.push(Block::new(input_dim, &config.mlp_units, basis, n_outputs, rng));
                schedule.push(blocks.len() - 1);
            }
        }

        Self {
            blocks,
            schedule,
            activation: config.activation,
            dropout: config.dropout_prob_theta,
            input_size: l,
            h,
            n_outputs,
            uses_exog_basis: config.stack_types.contains(&StackType::Exogenous),
        }
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// Blocks applied per forward pass.
    pub fn depth(&self) -> usize {
        self.schedule.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.blocks.iter().map(|b| b.num_parameters()).sum()
    }

    /// All layers, in the order [`Network::backward`] returns gradients.
    pub fn layers_mut(&mut self) -> Vec<&mut DenseLayer> {
        self.blocks
            .iter_mut()
            .flat_map(|b| b.layers.iter_mut())
            .collect()
    }

    /// Forward pass over a scaled batch; dropout is active when `rng` is given.
    ///
    /// The insample window is read most-recent first. Output 0 starts from the
    /// last observed value (naive level); the other outputs start at zero.
    pub fn forward<R: Rng>(
        &self,
        batch: &Batch,
        mut rng: Option<&mut R>,
    ) -> Result<(Vec<Array2<f64>>, NetworkCache)> {
        let l = self.input_size;
        if batch.insample_y.ncols() != l {
            return Err(ForecastError::DimensionMismatch {
                expected: l,
                got: batch.insample_y.ncols(),
            });
        }
        if batch.outsample_y.ncols() != self.h {
            return Err(ForecastError::DimensionMismatch {
                expected: self.h,
                got: batch.outsample_y.ncols(),
            });
        }
        let b = batch.len();
        let mask = batch.insample_mask.slice(s![.., ..;-1]).to_owned();
        let mut residuals = batch.insample_y.slice(s![.., ..;-1]).to_owned() * &mask;

        let exog = if self.uses_exog_basis {
            Some(ExogTemplates {
                backcast: exog_templates(&batch.futr_exog, l, true),
                forecast: exog_templates(&batch.futr_exog, l, false),
            })
        } else {
            None
        };

        let mut outputs = vec![Array2::zeros((b, self.h)); self.n_outputs];
        let level = batch.insample_y.column(l - 1);
        outputs[0] = Array2::from_shape_fn((b, self.h), |(i, _)| level[i]);

        let mut caches = Vec::with_capacity(self.schedule.len());
        for &idx in &self.schedule {
            let input = block_input(&residuals, batch)?;
            let (backcast, forecasts, cache) = self.blocks[idx].forward(
                input,
                self.activation,
                self.dropout,
                rng.as_deref_mut(),
                exog.as_ref(),
            )?;
            residuals = (&residuals - &backcast) * &mask;
            for (out, f) in outputs.iter_mut().zip(&forecasts) {
                *out += f;
            }
            caches.push(cache);
        }

        Ok((
            outputs,
            NetworkCache {
                mask,
                blocks: caches,
                exog,
            },
        ))
    }

    /// Inference pass without dropout.
    pub fn predict(&self, batch: &Batch) -> Result<Vec<Array2<f64>>> {
        self.forward::<rand::rngs::StdRng>(batch, None)
            .map(|(outputs, _)| outputs)
    }

    /// Gradients of every layer given the gradients of the outputs.
    pub fn backward(
        &self,
        cache: &NetworkCache,
        grad_outputs: &[Array2<f64>],
    ) -> Result<Vec<DenseGrads>> {
        if grad_outputs.len() != self.n_outputs {
            return Err(ForecastError::DimensionMismatch {
                expected: self.n_outputs,
                got: grad_outputs.len(),
            });
        }
        if cache.blocks.len() != self.schedule.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.schedule.len(),
                got: cache.blocks.len(),
            });
        }
        let l = self.input_size;
        let mut totals: Vec<Vec<DenseGrads>> = self
            .blocks
            .iter()
            .map(|b| b.layers.iter().map(DenseGrads::zeros_like).collect())
            .collect();

        let mut grad_residuals: Array2<f64> = Array2::zeros(cache.mask.dim());
        for (pos, &idx) in self.schedule.iter().enumerate().rev() {
            let grad_backcast = -(&grad_residuals * &cache.mask);
            let (grad_input, grads) = self.blocks[idx].backward(
                &cache.blocks[pos],
                &grad_backcast,
                grad_outputs,
                self.activation,
                cache.exog.as_ref(),
            )?;
            grad_residuals = &grad_residuals * &cache.mask + &grad_input.slice(s![.., ..l]);
            for (total, g) in totals[idx].iter_mut().zip(&grads) {
                total.accumulate(g);
            }
        }

        Ok(totals.into_iter().flatten().collect())
    }
}

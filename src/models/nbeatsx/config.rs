//! NBEATSx hyperparameters.

use crate::data::ExogSpec;
use crate::error::{ForecastError, Result};
use crate::models::losses::Loss;
use crate::models::nn::Activation;
use crate::transform::ScalerType;
use serde::{Deserialize, Serialize};

/// Basis expansion used by every block of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackType {
    /// Unconstrained (generic) basis.
    Identity,
    /// Low-order polynomials.
    Trend,
    /// Fourier terms.
    Seasonality,
    /// The window's own future exogenous covariates.
    Exogenous,
}

/// Configuration of an [`NBEATSx`](super::NBEATSx) model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NBEATSxConfig {
    /// Forecast horizon.
    pub h: usize,
    /// Number of past observations fed to the network.
    pub input_size: usize,
    pub loss: Loss,
    /// Loss monitored on the validation windows; `None` reuses `loss`.
    pub valid_loss: Option<Loss>,
    pub scaler_type: ScalerType,
    pub dropout_prob_theta: f64,
    pub stat_exog_list: Vec<String>,
    pub hist_exog_list: Vec<String>,
    pub futr_exog_list: Vec<String>,
    pub stack_types: Vec<StackType>,
    pub n_blocks: Vec<usize>,
    /// `[in, out]` of every hidden layer, shared by all blocks.
    pub mlp_units: Vec<[usize; 2]>,
    pub n_harmonics: usize,
    pub n_polynomials: usize,
    pub activation: Activation,
    pub shared_weights: bool,
    pub max_steps: usize,
    pub learning_rate: f64,
    pub num_lr_decays: usize,
    pub val_check_steps: usize,
    /// Validation checks without improvement before stopping; negative disables.
    pub early_stop_patience_steps: i64,
    pub batch_size: usize,
    pub step_size: usize,
    pub start_padding_enabled: bool,
    pub random_seed: u64,
    /// Output column name; defaults to `NBEATSx`.
    pub alias: Option<String>,
}

impl Default for NBEATSxConfig {
    fn default() -> Self {
        Self {
            h: 0,
            input_size: 0,
            loss: Loss::Mae,
            valid_loss: None,
            scaler_type: ScalerType::Identity,
            dropout_prob_theta: 0.0,
            stat_exog_list: Vec::new(),
            hist_exog_list: Vec::new(),
            futr_exog_list: Vec::new(),
            stack_types: vec![StackType::Identity, StackType::Trend, StackType::Seasonality],
            n_blocks: vec![1, 1, 1],
            mlp_units: vec![[512, 512]; 3],
            n_harmonics: 2,
            n_polynomials: 2,
            activation: Activation::ReLU,
            shared_weights: false,
            max_steps: 1000,
            learning_rate: 1e-3,
            num_lr_decays: 3,
            val_check_steps: 100,
            early_stop_patience_steps: -1,
            batch_size: 32,
            step_size: 1,
            start_padding_enabled: false,
            random_seed: 1,
            alias: None,
        }
    }
}

impl NBEATSxConfig {
    pub fn new(h: usize, input_size: usize) -> Self {
        Self {
            h,
            input_size,
            ..Default::default()
        }
    }

    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_valid_loss(mut self, loss: Loss) -> Self {
        self.valid_loss = Some(loss);
        self
    }

    pub fn with_scaler(mut self, scaler: ScalerType) -> Self {
        self.scaler_type = scaler;
        self
    }

    pub fn with_dropout(mut self, p: f64) -> Self {
        self.dropout_prob_theta = p;
        self
    }

    pub fn with_stat_exog(mut self, columns: &[&str]) -> Self {
        self.stat_exog_list = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_hist_exog(mut self, columns: &[&str]) -> Self {
        self.hist_exog_list = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_futr_exog(mut self, columns: &[&str]) -> Self {
        self.futr_exog_list = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Set the stacks; every stack gets `blocks_per_stack` blocks.
    pub fn with_stacks(mut self, stacks: Vec<StackType>, blocks_per_stack: usize) -> Self {
        self.n_blocks = vec![blocks_per_stack; stacks.len()];
        self.stack_types = stacks;
        self
    }

    pub fn with_mlp_units(mut self, units: Vec<[usize; 2]>) -> Self {
        self.mlp_units = units;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_shared_weights(mut self, shared: bool) -> Self {
        self.shared_weights = shared;
        self
    }

    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_val_check_steps(mut self, steps: usize) -> Self {
        self.val_check_steps = steps;
        self
    }

    pub fn with_early_stop_patience(mut self, checks: i64) -> Self {
        self.early_stop_patience_steps = checks;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_start_padding(mut self, enabled: bool) -> Self {
        self.start_padding_enabled = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The loss used for validation checks.
    pub fn effective_valid_loss(&self) -> &Loss {
        self.valid_loss.as_ref().unwrap_or(&self.loss)
    }

    pub fn exog_spec(&self) -> ExogSpec {
        ExogSpec {
            hist: self.hist_exog_list.clone(),
            futr: self.futr_exog_list.clone(),
            stat: self.stat_exog_list.clone(),
        }
    }

    /// Early stopping patience, `None` when disabled.
    pub fn patience(&self) -> Option<usize> {
        usize::try_from(self.early_stop_patience_steps)
            .ok()
            .filter(|&p| p > 0)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ForecastError::InvalidParameter(msg));

        if self.h == 0 {
            return invalid("h must be positive".to_string());
        }
        if self.input_size == 0 {
            return invalid("input_size must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout_prob_theta) {
            return invalid(format!(
                "dropout_prob_theta must lie in [0, 1), got {}",
                self.dropout_prob_theta
            ));
        }
        if self.stack_types.is_empty() {
            return invalid("at least one stack is required".to_string());
        }
        if self.stack_types.len() != self.n_blocks.len() {
            return invalid(format!(
                "stack_types has {} entries but n_blocks has {}",
                self.stack_types.len(),
                self.n_blocks.len()
            ));
        }
        if self.n_blocks.iter().any(|&n| n == 0) {
            return invalid("every stack needs at least one block".to_string());
        }
        if self.mlp_units.is_empty() {
            return invalid("mlp_units must list at least one layer".to_string());
        }
        for pair in self.mlp_units.windows(2) {
            if pair[0][1] != pair[1][0] {
                return invalid(format!(
                    "mlp_units do not chain: {:?} then {:?}",
                    pair[0], pair[1]
                ));
            }
        }
        if self.mlp_units.iter().flatten().any(|&u| u == 0) {
            return invalid("mlp_units must be positive".to_string());
        }
        if self.n_harmonics == 0 {
            return invalid("n_harmonics must be at least 1".to_string());
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be positive".to_string());
        }
        if self.val_check_steps == 0 {
            return invalid("val_check_steps must be positive".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive".to_string());
        }
        if self.step_size == 0 {
            return invalid("step_size must be positive".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if self.stack_types.contains(&StackType::Exogenous) && self.futr_exog_list.is_empty() {
            return invalid("an exogenous stack needs futr_exog_list".to_string());
        }
        self.loss.validate()?;
        let valid = self.effective_valid_loss();
        valid.validate()?;
        if valid != &self.loss && !valid.is_point() {
            return invalid(format!(
                "valid_loss must equal loss or be a point loss, got {}",
                valid.name()
            ));
        }
        Ok(())
    }
}

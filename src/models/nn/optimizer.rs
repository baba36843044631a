//! Adam optimizer and step learning-rate schedule.

use super::layer::{DenseGrads, DenseLayer};
use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2, Zip};

/// Adam optimizer (Adaptive Moment Estimation) over a fixed list of layers.
#[derive(Debug, Clone)]
pub struct Adam {
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
    m: Vec<DenseGrads>,
    v: Vec<DenseGrads>,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new()
    }
}

impl Adam {
    pub fn new() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Apply one update. `layers` and `grads` must be in the same order on every call.
    pub fn step(
        &mut self,
        layers: Vec<&mut DenseLayer>,
        grads: &[DenseGrads],
        learning_rate: f64,
    ) -> Result<()> {
        if layers.len() != grads.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: layers.len(),
                got: grads.len(),
            });
        }
        if self.m.is_empty() {
            self.m = layers.iter().map(|l| DenseGrads::zeros_like(l)).collect();
            self.v = self.m.clone();
        }
        self.t += 1;
        let c1 = 1.0 - self.beta1.powi(self.t);
        let c2 = 1.0 - self.beta2.powi(self.t);
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);

        for (i, layer) in layers.into_iter().enumerate() {
            update_2d(
                &mut layer.weights,
                &grads[i].weights,
                &mut self.m[i].weights,
                &mut self.v[i].weights,
                learning_rate,
                b1,
                b2,
                eps,
                c1,
                c2,
            );
            update_1d(
                &mut layer.biases,
                &grads[i].biases,
                &mut self.m[i].biases,
                &mut self.v[i].biases,
                learning_rate,
                b1,
                b2,
                eps,
                c1,
                c2,
            );
        }
        Ok(())
    }
}

macro_rules! adam_update {
    ($name:ident, $arr:ty) => {
        fn $name(
            param: &mut $arr,
            grad: &$arr,
            m: &mut $arr,
            v: &mut $arr,
            lr: f64,
            b1: f64,
            b2: f64,
            eps: f64,
            c1: f64,
            c2: f64,
        ) {
            Zip::from(param)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    let m_hat = *m / c1;
                    let v_hat = *v / c2;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    };
}

adam_update!(update_2d, Array2<f64>);
adam_update!(update_1d, Array1<f64>);

/// Multiplies the base rate by `gamma` every `step_size` steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLr {
    pub base_lr: f64,
    pub step_size: usize,
    pub gamma: f64,
}

impl StepLr {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
        }
    }

    /// Spread `num_decays` halvings evenly over `max_steps`; zero decays keeps the rate fixed.
    pub fn for_training(base_lr: f64, max_steps: usize, num_decays: usize) -> Self {
        if num_decays == 0 {
            Self::new(base_lr, usize::MAX, 0.5)
        } else {
            Self::new(base_lr, max_steps / num_decays, 0.5)
        }
    }

    /// Learning rate for a 0-based step index.
    pub fn lr_at(&self, step: usize) -> f64 {
        self.base_lr * self.gamma.powi((step / self.step_size) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn first_adam_step_moves_by_learning_rate() {
        let mut layer = DenseLayer {
            weights: array![[1.0, 1.0]],
            biases: array![0.0, 0.0],
        };
        let grads = vec![DenseGrads {
            weights: array![[0.5, -2.0]],
            biases: array![1.0, 0.0],
        }];
        let mut adam = Adam::new();
        adam.step(vec![&mut layer], &grads, 0.1).unwrap();

        // Bias-corrected first step is lr * sign(g)
        assert_relative_eq!(layer.weights[[0, 0]], 0.9, epsilon = 1e-6);
        assert_relative_eq!(layer.weights[[0, 1]], 1.1, epsilon = 1e-6);
        assert_relative_eq!(layer.biases[0], -0.1, epsilon = 1e-6);
        assert_relative_eq!(layer.biases[1], 0.0);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn adam_minimizes_a_quadratic() {
        let mut layer = DenseLayer {
            weights: array![[5.0]],
            biases: array![-3.0],
        };
        let mut adam = Adam::new();
        for _ in 0..2000 {
            let grads = vec![DenseGrads {
                weights: &layer.weights * 2.0,
                biases: &layer.biases * 2.0,
            }];
            adam.step(vec![&mut layer], &grads, 0.05).unwrap();
        }
        assert!(layer.weights[[0, 0]].abs() < 1e-2);
        assert!(layer.biases[0].abs() < 1e-2);
    }

    #[test]
    fn mismatched_gradients_are_rejected() {
        let mut layer = DenseLayer {
            weights: array![[1.0]],
            biases: array![0.0],
        };
        assert!(Adam::new().step(vec![&mut layer], &[], 0.1).is_err());
    }

    #[test]
    fn step_schedule_halves() {
        let s = StepLr::for_training(1e-3, 200, 3);
        assert_eq!(s.step_size, 66);
        assert_relative_eq!(s.lr_at(0), 1e-3);
        assert_relative_eq!(s.lr_at(66), 5e-4);
        assert_relative_eq!(s.lr_at(199), 1.25e-4);
        assert_relative_eq!(StepLr::for_training(1e-3, 200, 0).lr_at(199), 1e-3);
    }
}

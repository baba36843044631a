//! Dense (fully connected) layer: `output = input · W + b`.
//!
//! Layers hold parameters only. Forward activations are kept by the caller so
//! the same layer can be applied several times in one pass (shared weights).

use ndarray::{Array1, Array2, Axis};
use rand::Rng;

/// Fully connected layer with Xavier-uniform initialization.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    /// Weight matrix (input_size x output_size)
    pub weights: Array2<f64>,
    /// Bias vector (output_size)
    pub biases: Array1<f64>,
}

/// Gradients of one [`DenseLayer`].
#[derive(Debug, Clone)]
pub struct DenseGrads {
    pub weights: Array2<f64>,
    pub biases: Array1<f64>,
}

impl DenseGrads {
    pub fn zeros_like(layer: &DenseLayer) -> Self {
        Self {
            weights: Array2::zeros(layer.weights.dim()),
            biases: Array1::zeros(layer.biases.len()),
        }
    }

    pub fn accumulate(&mut self, other: &DenseGrads) {
        self.weights += &other.weights;
        self.biases += &other.biases;
    }
}

impl DenseLayer {
    pub fn new<R: Rng>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        let weights =
            Array2::from_shape_fn((input_size, output_size), |_| rng.gen_range(-limit..limit));
        Self {
            weights,
            biases: Array1::zeros(output_size),
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let mut z = input.dot(&self.weights);
        z += &self.biases;
        z
    }

    /// Returns `(input_gradient, weight_gradient)` for the given output gradient.
    pub fn backward(
        &self,
        input: &Array2<f64>,
        output_gradient: &Array2<f64>,
    ) -> (Array2<f64>, DenseGrads) {
        let grads = DenseGrads {
            weights: input.t().dot(output_gradient),
            biases: output_gradient.sum_axis(Axis(0)),
        };
        let input_gradient = output_gradient.dot(&self.weights.t());
        (input_gradient, grads)
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

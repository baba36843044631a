//! Basis expansions that turn block coefficients into backcasts and forecasts.

use super::config::StackType;
use ndarray::{s, Array2, Array3, Axis};
use std::f64::consts::PI;

/// Coefficient-to-signal map of one block.
#[derive(Debug, Clone)]
pub enum Basis {
    /// Fixed templates: backcast `[p_b, input_size]`, forecast `[p_f, h]`.
    Fixed {
        backcast: Array2<f64>,
        forecast: Array2<f64>,
    },
    /// Each window's future exogenous channels are the templates.
    Exogenous { channels: usize },
}

impl Basis {
    pub fn new(
        stack: StackType,
        input_size: usize,
        h: usize,
        n_polynomials: usize,
        n_harmonics: usize,
        futr_channels: usize,
    ) -> Self {
        match stack {
            StackType::Identity => Basis::Fixed {
                backcast: Array2::eye(input_size),
                forecast: Array2::eye(h),
            },
            StackType::Trend => Basis::Fixed {
                backcast: polynomial(input_size, n_polynomials),
                forecast: polynomial(h, n_polynomials),
            },
            StackType::Seasonality => {
                let freqs = harmonic_frequencies(n_harmonics, h);
                Basis::Fixed {
                    backcast: fourier(input_size, h, &freqs, -1.0),
                    forecast: fourier(h, h, &freqs, 1.0),
                }
            }
            StackType::Exogenous => Basis::Exogenous {
                channels: futr_channels,
            },
        }
    }

    /// Coefficients for the backcast.
    pub fn backcast_size(&self) -> usize {
        match self {
            Basis::Fixed { backcast, .. } => backcast.nrows(),
            Basis::Exogenous { channels } => *channels,
        }
    }

    /// Coefficients per output for the forecast.
    pub fn forecast_size(&self) -> usize {
        match self {
            Basis::Fixed { forecast, .. } => forecast.nrows(),
            Basis::Exogenous { channels } => *channels,
        }
    }

    /// `theta [B, p] → [B, len]`. `exog` is the window's future covariates
    /// restricted to the relevant steps, `[B, len, C]`.
    pub fn expand(&self, theta: &Array2<f64>, backcast: bool, exog: &Array3<f64>) -> Array2<f64> {
        match self {
            Basis::Fixed {
                backcast: b,
                forecast: f,
            } => theta.dot(if backcast { b } else { f }),
            Basis::Exogenous { .. } => {
                let (batch, len, _) = exog.dim();
                let mut out = Array2::zeros((batch, len));
                for (i, sample) in exog.axis_iter(Axis(0)).enumerate() {
                    out.row_mut(i).assign(&sample.dot(&theta.row(i)));
                }
                out
            }
        }
    }

    /// Gradient of [`Basis::expand`] with respect to `theta`.
    pub fn theta_grad(
        &self,
        grad: &Array2<f64>,
        backcast: bool,
        exog: &Array3<f64>,
    ) -> Array2<f64> {
        match self {
            Basis::Fixed {
                backcast: b,
                forecast: f,
            } => grad.dot(&(if backcast { b } else { f }).t()),
            Basis::Exogenous { channels } => {
                let mut out = Array2::zeros((grad.nrows(), *channels));
                for (i, sample) in exog.axis_iter(Axis(0)).enumerate() {
                    out.row_mut(i).assign(&sample.t().dot(&grad.row(i)));
                }
                out
            }
        }
    }
}

/// Covariate steps used by an exogenous basis: the insample part reversed to
/// match the residual ordering, or the horizon part.
pub fn exog_templates(futr_exog: &Array3<f64>, input_size: usize, backcast: bool) -> Array3<f64> {
    if backcast {
        futr_exog
            .slice(s![.., ..input_size;-1, ..])
            .to_owned()
    } else {
        futr_exog.slice(s![.., input_size.., ..]).to_owned()
    }
}

/// Rows `(t/len)^i` for `i = 0..=degree`.
fn polynomial(len: usize, degree: usize) -> Array2<f64> {
    Array2::from_shape_fn((degree + 1, len), |(i, t)| (t as f64 / len as f64).powi(i as i32))
}

/// Frequency grid `0, 1, 1 + 1/n, ...` in steps of `1/n_harmonics`, below `h/2`.
pub(crate) fn harmonic_frequencies(n_harmonics: usize, h: usize) -> Vec<f64> {
    let harmonics = n_harmonics as f64;
    let stop = harmonics / 2.0 * h as f64;
    let mut freqs = vec![0.0];
    let mut k = harmonics;
    while k < stop {
        freqs.push(k / harmonics);
        k += 1.0;
    }
    freqs
}

/// Cosine rows followed by sine rows over `len` steps.
fn fourier(len: usize, h: usize, freqs: &[f64], sign: f64) -> Array2<f64> {
    let n = freqs.len();
    Array2::from_shape_fn((2 * n, len), |(row, t)| {
        let f = freqs[row % n];
        let angle = sign * 2.0 * PI * (t as f64 / h as f64) * f;
        if row < n {
            angle.cos()
        } else {
            angle.sin()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn seasonality_basis_size_matches_harmonic_grid() {
        let freqs = harmonic_frequencies(2, 12);
        assert_eq!(freqs.len(), 11);
        assert_relative_eq!(freqs[1], 1.0);
        assert_relative_eq!(freqs[10], 5.5);

        let basis = Basis::new(StackType::Seasonality, 24, 12, 2, 2, 0);
        assert_eq!(basis.backcast_size(), 22);
        assert_eq!(basis.forecast_size(), 22);
    }

    #[test]
    fn trend_basis_starts_at_constant() {
        if let Basis::Fixed { forecast, .. } = Basis::new(StackType::Trend, 8, 4, 2, 1, 0) {
            assert_eq!(forecast.dim(), (3, 4));
            assert!(forecast.row(0).iter().all(|&v| v == 1.0));
            assert_relative_eq!(forecast[[2, 2]], 0.25);
        } else {
            panic!("trend basis should be fixed");
        }
    }

    #[test]
    fn identity_basis_passes_theta_through() {
        let basis = Basis::new(StackType::Identity, 3, 2, 0, 1, 0);
        let theta = array![[1.0, 2.0]];
        let empty = Array3::zeros((1, 0, 0));
        assert_eq!(basis.expand(&theta, false, &empty), theta);
    }

    #[test]
    fn exogenous_gradient_is_transpose_of_expand() {
        let basis = Basis::new(StackType::Exogenous, 2, 2, 0, 1, 2);
        let exog = Array3::from_shape_vec((1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let theta = array![[0.5, -1.0]];
        let out = basis.expand(&theta, false, &exog);
        assert_eq!(out, array![[-1.5, -2.5]]);

        let g = array![[1.0, 1.0]];
        assert_eq!(basis.theta_grad(&g, false, &exog), array![[4.0, 6.0]]);
    }

    #[test]
    fn backcast_templates_are_reversed() {
        let exog = Array3::from_shape_fn((1, 5, 1), |(_, t, _)| t as f64);
        let back = exog_templates(&exog, 3, true);
        assert_eq!(back.iter().copied().collect::<Vec<_>>(), vec![2.0, 1.0, 0.0]);
        let fwd = exog_templates(&exog, 3, false);
        assert_eq!(fwd.iter().copied().collect::<Vec<_>>(), vec![3.0, 4.0]);
    }
}

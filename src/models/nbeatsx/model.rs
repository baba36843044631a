//! NBEATSx forecaster: training loop and prediction.

use super::config::NBEATSxConfig;
use super::network::{ExogDims, Network};
use crate::core::Forecast;
use crate::data::{ExogSpec, FutureExog, TimeSeriesDataset, Window, WindowLayout, WindowSampler};
use crate::error::{ForecastError, Result};
use crate::models::losses::Loss;
use crate::models::nn::{Adam, StepLr};
use crate::models::{Forecaster, TrainingReport};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

/// Neural basis expansion with exogenous variables.
///
/// # Example
/// ```
/// use anofox_neuralforecast::data::{ExogSpec, FutureExog, TimeSeriesDataset};
/// use anofox_neuralforecast::models::{Forecaster, NBEATSx, NBEATSxConfig};
/// use anofox_neuralforecast::PanelFrame;
/// use chrono::NaiveDate;
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let panel = PanelFrame::builder()
///     .ids(vec!["a".to_string(); 40])
///     .dates((0..40).map(|i| start + chrono::Duration::days(i)).collect())
///     .column("y", (0..40).map(|i| (i % 7) as f64).collect())
///     .build()
///     .unwrap();
/// let dataset = TimeSeriesDataset::from_panel(&panel, None, "y", &ExogSpec::default()).unwrap();
///
/// let config = NBEATSxConfig::new(7, 14)
///     .with_mlp_units(vec![[16, 16]])
///     .with_max_steps(20);
/// let mut model = NBEATSx::new(config).unwrap();
/// model.fit(&dataset, 0).unwrap();
///
/// let forecasts = model.predict(&dataset, &FutureExog::empty()).unwrap();
/// assert_eq!(forecasts[0].horizon(), 7);
/// ```
#[derive(Debug, Clone)]
pub struct NBEATSx {
    config: NBEATSxConfig,
    network: Option<Network>,
    report: Option<TrainingReport>,
}

impl NBEATSx {
    /// Create an untrained model; the configuration is validated.
    pub fn new(config: NBEATSxConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            network: None,
            report: None,
        })
    }

    pub fn config(&self) -> &NBEATSxConfig {
        &self.config
    }

    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    /// Report of the last `fit`.
    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    fn layout(&self, dataset: &TimeSeriesDataset) -> Result<WindowLayout> {
        Ok(WindowLayout {
            input_size: self.config.input_size,
            h: self.config.h,
            channels: dataset.channel_map(&self.config.exog_spec())?,
        })
    }

    /// Mean validation loss over every validation window.
    fn validation_loss(
        &self,
        network: &Network,
        dataset: &TimeSeriesDataset,
        layout: &WindowLayout,
        windows: &[Window],
    ) -> Result<f64> {
        let mut batch = dataset.batch(windows, layout, None)?;
        batch.scale(self.config.scaler_type);
        let outputs = network.predict(&batch)?;

        let valid_loss = self.config.effective_valid_loss();
        let (loss, _) = if valid_loss == &self.config.loss {
            valid_loss.loss_and_grad(&outputs, &batch.outsample_y, &batch.outsample_mask)?
        } else {
            let point = self.config.loss.point(&outputs)?;
            valid_loss.loss_and_grad(&[point], &batch.outsample_y, &batch.outsample_mask)?
        };
        Ok(loss)
    }
}

impl Forecaster for NBEATSx {
    fn fit(&mut self, dataset: &TimeSeriesDataset, val_size: usize) -> Result<TrainingReport> {
        let cfg = &self.config;
        let layout = self.layout(dataset)?;
        let sampler = WindowSampler::new(
            dataset,
            cfg.input_size,
            cfg.h,
            val_size,
            cfg.step_size,
            cfg.start_padding_enabled,
        )?;

        let mut rng = StdRng::seed_from_u64(cfg.random_seed);
        let dims = ExogDims {
            hist: layout.channels.hist.len(),
            futr: layout.channels.futr.len(),
            stat: layout.channels.stat.len(),
        };
        let mut network = Network::new(cfg, dims, cfg.loss.n_outputs(), &mut rng);
        let mut optimizer = Adam::new();
        let schedule = StepLr::for_training(cfg.learning_rate, cfg.max_steps, cfg.num_lr_decays);
        let patience = cfg.patience();

        info!(
            model = self.alias(),
            parameters = network.num_parameters(),
            train_windows = sampler.train_windows().len(),
            valid_windows = sampler.valid_windows().len(),
            max_steps = cfg.max_steps,
            "training started"
        );

        let mut report = TrainingReport {
            model: self.alias().to_string(),
            ..Default::default()
        };
        let mut best = f64::INFINITY;
        let mut bad_checks = 0usize;

        for step in 0..cfg.max_steps {
            let windows = sampler.sample(cfg.batch_size, &mut rng);
            let mut batch = dataset.batch(&windows, &layout, None)?;
            batch.scale(cfg.scaler_type);

            let (outputs, cache) = network.forward(&batch, Some(&mut rng))?;
            let (loss, grad) =
                cfg.loss
                    .loss_and_grad(&outputs, &batch.outsample_y, &batch.outsample_mask)?;
            if !loss.is_finite() {
                warn!(model = self.alias(), step = step + 1, loss, "training loss is not finite");
                return Err(ForecastError::ComputationError(format!(
                    "non-finite training loss at step {}",
                    step + 1
                )));
            }
            let grads = network.backward(&cache, &grad)?;
            optimizer.step(network.layers_mut(), &grads, schedule.lr_at(step))?;
            report.train_loss.push(loss);
            report.steps = step + 1;

            if sampler.valid_windows().is_empty() || (step + 1) % cfg.val_check_steps != 0 {
                continue;
            }
            let valid = self.validation_loss(&network, dataset, &layout, sampler.valid_windows())?;
            if !valid.is_finite() {
                warn!(model = self.alias(), step = step + 1, "validation loss is not finite");
                return Err(ForecastError::ComputationError(format!(
                    "non-finite validation loss at step {}",
                    step + 1
                )));
            }
            debug!(
                model = self.alias(),
                step = step + 1,
                train_loss = loss,
                valid_loss = valid,
                "validation check"
            );
            report.valid_loss.push((step + 1, valid));
            if valid < best {
                best = valid;
                bad_checks = 0;
            } else {
                bad_checks += 1;
            }
            if let Some(p) = patience {
                if bad_checks >= p {
                    info!(
                        model = self.alias(),
                        step = step + 1,
                        best_valid_loss = best,
                        "early stopping"
                    );
                    report.early_stopped = true;
                    break;
                }
            }
        }

        report.best_valid_loss = best.is_finite().then_some(best);
        info!(
            model = self.alias(),
            steps = report.steps,
            train_loss = report.recent_train_loss(10).unwrap_or(f64::NAN),
            early_stopped = report.early_stopped,
            "training finished"
        );

        self.network = Some(network);
        self.report = Some(report.clone());
        Ok(report)
    }

    fn predict(&self, dataset: &TimeSeriesDataset, futr: &FutureExog) -> Result<Vec<Forecast>> {
        let network = self.network.as_ref().ok_or(ForecastError::FitRequired)?;
        let layout = self.layout(dataset)?;
        let windows: Vec<Window> = dataset
            .series()
            .iter()
            .enumerate()
            .map(|(series, s)| Window {
                series,
                cutoff: s.len(),
            })
            .collect();

        let mut batch = dataset.batch(&windows, &layout, Some(futr))?;
        let stats = batch.scale(self.config.scaler_type);
        let outputs = network.predict(&batch)?;

        let forecasts = stats
            .iter()
            .enumerate()
            .map(|(row, s)| self.config.loss.forecast_row(&outputs, row, *s))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            model = self.alias(),
            series = forecasts.len(),
            h = self.config.h,
            "prediction done"
        );
        Ok(forecasts)
    }

    fn name(&self) -> &str {
        "NBEATSx"
    }

    fn alias(&self) -> &str {
        self.config.alias.as_deref().unwrap_or("NBEATSx")
    }

    fn horizon(&self) -> usize {
        self.config.h
    }

    fn input_size(&self) -> usize {
        self.config.input_size
    }

    fn loss(&self) -> &Loss {
        &self.config.loss
    }

    fn exog_lists(&self) -> ExogSpec {
        self.config.exog_spec()
    }

    fn is_fitted(&self) -> bool {
        self.network.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PanelFrame;
    use crate::models::losses::Distribution;
    use crate::models::nbeatsx::StackType;
    use crate::transform::ScalerType;
    use chrono::NaiveDate;

    fn seasonal_dataset(n: usize) -> TimeSeriesDataset {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut ids = Vec::new();
        let mut dates = Vec::new();
        let mut y = Vec::new();
        for (id, level) in [("a", 10.0), ("b", 20.0)] {
            for t in 0..n {
                ids.push(id.to_string());
                dates.push(start + chrono::Duration::days(t as i64));
                y.push(level + 3.0 * (t as f64 * std::f64::consts::PI / 3.0).sin());
            }
        }
        let panel = PanelFrame::builder()
            .ids(ids)
            .dates(dates)
            .column("y", y)
            .build()
            .unwrap();
        TimeSeriesDataset::from_panel(&panel, None, "y", &ExogSpec::default()).unwrap()
    }

    fn small(h: usize, l: usize) -> NBEATSxConfig {
        NBEATSxConfig::new(h, l)
            .with_mlp_units(vec![[16, 16]])
            .with_batch_size(16)
    }

    #[test]
    fn predict_before_fit_fails() {
        let model = NBEATSx::new(small(3, 6)).unwrap();
        let ds = seasonal_dataset(30);
        assert_eq!(
            model.predict(&ds, &FutureExog::empty()).unwrap_err(),
            ForecastError::FitRequired
        );
    }

    #[test]
    fn training_reduces_loss() {
        let cfg = small(3, 6)
            .with_loss(Loss::Mse)
            .with_max_steps(150)
            .with_learning_rate(5e-3);
        let mut model = NBEATSx::new(cfg).unwrap();
        let report = model.fit(&seasonal_dataset(60), 0).unwrap();
        assert_eq!(report.steps, 150);
        let first: f64 = report.train_loss[..10].iter().sum::<f64>() / 10.0;
        let last = report.recent_train_loss(10).unwrap();
        assert!(last < first, "loss went from {} to {}", first, last);
        assert!(report.valid_loss.is_empty());
        assert!(model.is_fitted());
    }

    #[test]
    fn validation_checks_follow_interval() {
        let cfg = small(3, 6).with_max_steps(20).with_val_check_steps(5);
        let mut model = NBEATSx::new(cfg).unwrap();
        let report = model.fit(&seasonal_dataset(40), 6).unwrap();
        let steps: Vec<usize> = report.valid_loss.iter().map(|(s, _)| *s).collect();
        assert_eq!(steps, vec![5, 10, 15, 20]);
        assert!(report.best_valid_loss.is_some());
    }

    #[test]
    fn early_stopping_ends_training() {
        // Checking every step with patience 1 stops at the first non-improving check.
        let cfg = small(3, 6)
            .with_max_steps(500)
            .with_val_check_steps(1)
            .with_early_stop_patience(1)
            .with_learning_rate(1e-2);
        let mut model = NBEATSx::new(cfg).unwrap();
        let report = model.fit(&seasonal_dataset(40), 6).unwrap();
        assert!(report.early_stopped);
        assert!(report.steps < 500);
        let losses: Vec<f64> = report.valid_loss.iter().map(|(_, l)| *l).collect();
        let n = losses.len();
        assert!(n >= 2);
        let best_before = losses[..n - 1].iter().copied().fold(f64::INFINITY, f64::min);
        assert!(losses[n - 1] >= best_before);
    }

    #[test]
    fn distribution_forecast_has_ordered_quantiles() {
        let cfg = small(3, 6)
            .with_loss(Loss::distribution(Distribution::Normal, vec![80.0, 90.0]))
            .with_scaler(ScalerType::Robust)
            .with_dropout(0.2)
            .with_max_steps(30);
        let mut model = NBEATSx::new(cfg).unwrap();
        let ds = seasonal_dataset(40);
        model.fit(&ds, 3).unwrap();

        let forecasts = model.predict(&ds, &FutureExog::empty()).unwrap();
        assert_eq!(forecasts.len(), 2);
        for f in &forecasts {
            let median = f.median().unwrap();
            let i80 = f.interval(80.0).unwrap();
            let i90 = f.interval(90.0).unwrap();
            for t in 0..3 {
                assert!(f.primary()[t].is_finite());
                assert!(i90.lower[t] <= i80.lower[t]);
                assert!(i80.lower[t] <= median[t] && median[t] <= i80.upper[t]);
                assert!(i80.upper[t] <= i90.upper[t]);
            }
        }
    }

    #[test]
    fn same_seed_gives_same_forecast() {
        let ds = seasonal_dataset(40);
        let run = || {
            let mut model = NBEATSx::new(small(3, 6).with_max_steps(10).with_seed(7)).unwrap();
            model.fit(&ds, 0).unwrap();
            model.predict(&ds, &FutureExog::empty()).unwrap()[0].primary().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn student_t_and_mq_losses_train() {
        for loss in [
            Loss::distribution(Distribution::StudentT, vec![90.0]),
            Loss::mq(vec![80.0]),
        ] {
            let cfg = small(3, 6)
                .with_loss(loss)
                .with_stacks(vec![StackType::Trend, StackType::Seasonality], 2)
                .with_shared_weights(true)
                .with_max_steps(10);
            let mut model = NBEATSx::new(cfg).unwrap();
            let ds = seasonal_dataset(30);
            model.fit(&ds, 0).unwrap();
            let f = model.predict(&ds, &FutureExog::empty()).unwrap();
            assert!(f[0].primary().iter().all(|v| v.is_finite()));
            assert_eq!(f[0].levels().len(), 1);
        }
    }
}

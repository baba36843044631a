//! End-to-end NBEATSx run on the AirPassengers panel.
//!
//! Loads the two-airline panel, holds out the last `horizon` months, trains an
//! NBEATSx model with a Normal distribution head, predicts the held-out months
//! and assembles a single-series frame for plotting.

use crate::core::{format_level, Forecast, Frequency, PanelFrame, StaticFrame};
use crate::data::{air_passengers_panel, air_passengers_static};
use crate::error::{ForecastError, Result};
use crate::models::nn::Activation;
use crate::models::{
    BoxedForecaster, Distribution, Loss, NBEATSx, NBEATSxConfig, TrainingReport,
};
use crate::neural_forecast::{NeuralForecast, TARGET_COL};
use crate::plot::{QuantilePlot, PURPLE};
use crate::transform::ScalerType;
use crate::utils::{evaluate_forecast, ForecastEvaluation};
use plotters::style::{BLACK, BLUE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Knobs of the AirPassengers run. Defaults reproduce the reference setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub horizon: usize,
    pub input_size: usize,
    pub distribution: Distribution,
    pub levels: Vec<f64>,
    pub scaler_type: ScalerType,
    pub dropout_prob_theta: f64,
    pub stat_exog_list: Vec<String>,
    pub futr_exog_list: Vec<String>,
    pub max_steps: usize,
    pub val_check_steps: usize,
    pub early_stop_patience_steps: i64,
    pub val_size: usize,
    /// Hidden layers; `None` keeps the model default.
    pub mlp_units: Option<Vec<[usize; 2]>>,
    pub activation: Activation,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub random_seed: u64,
    /// Series shown in the plot frame.
    pub series: String,
    /// Interval shaded in the plot.
    pub plot_level: f64,
    /// Static covariates CSV (`unique_id,<columns...>`) replacing the bundled table.
    pub static_path: Option<PathBuf>,
    pub plot_path: Option<PathBuf>,
    pub csv_path: Option<PathBuf>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            horizon: 12,
            input_size: 24,
            distribution: Distribution::Normal,
            levels: vec![80.0, 90.0],
            scaler_type: ScalerType::Robust,
            dropout_prob_theta: 0.5,
            stat_exog_list: vec!["airline1".to_string()],
            futr_exog_list: vec!["trend".to_string()],
            max_steps: 200,
            val_check_steps: 10,
            early_stop_patience_steps: 2,
            val_size: 12,
            mlp_units: None,
            activation: Activation::ReLU,
            learning_rate: 1e-3,
            batch_size: 32,
            random_seed: 1,
            series: "Airline1".to_string(),
            plot_level: 90.0,
            static_path: None,
            plot_path: None,
            csv_path: None,
        }
    }
}

impl WorkflowConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// The NBEATSx configuration this run trains.
    pub fn model_config(&self) -> NBEATSxConfig {
        let mut config = NBEATSxConfig::new(self.horizon, self.input_size)
            .with_loss(Loss::distribution(self.distribution, self.levels.clone()))
            .with_scaler(self.scaler_type)
            .with_dropout(self.dropout_prob_theta)
            .with_activation(self.activation)
            .with_max_steps(self.max_steps)
            .with_val_check_steps(self.val_check_steps)
            .with_early_stop_patience(self.early_stop_patience_steps)
            .with_learning_rate(self.learning_rate)
            .with_batch_size(self.batch_size)
            .with_seed(self.random_seed);
        config.stat_exog_list = self.stat_exog_list.clone();
        config.futr_exog_list = self.futr_exog_list.clone();
        if let Some(units) = &self.mlp_units {
            config.mlp_units = units.clone();
        }
        config
    }

    /// Static covariates of the run: `static_path` if set, else the bundled table.
    pub fn static_frame(&self) -> Result<StaticFrame> {
        match &self.static_path {
            Some(path) => {
                info!(path = %path.display(), "reading static covariates");
                StaticFrame::from_csv_path(path)
            }
            None => air_passengers_static(),
        }
    }
}

/// Everything the run produces.
#[derive(Debug, Clone)]
pub struct WorkflowOutput {
    pub train: PanelFrame,
    pub test: PanelFrame,
    /// Prediction frame: `unique_id`, `ds` and one column per model output.
    pub predictions: PanelFrame,
    /// Train rows followed by test rows joined with the predictions, for one series.
    pub plot_frame: PanelFrame,
    pub reports: Vec<TrainingReport>,
    /// Mean accuracy and interval coverage over all test rows.
    pub evaluation: ForecastEvaluation,
    /// Model alias used in the prediction columns.
    pub alias: String,
}

impl WorkflowOutput {
    /// Chart of the plot frame: true values, mean, median and one shaded level.
    pub fn plot(&self, level: f64, last_n: usize) -> QuantilePlot<'_> {
        let alias = &self.alias;
        let level = format_level(level);
        QuantilePlot::new(&self.plot_frame)
            .title(&format!("{} forecast", alias))
            .y_desc("Target [y]")
            .truth(TARGET_COL, "True", BLACK)
            .line(alias, "mean", PURPLE)
            .line(&format!("{}-median", alias), "median", BLUE)
            .band(
                &format!("{}-lo-{}", alias, level),
                &format!("{}-hi-{}", alias, level),
                &format!("level {}", level),
                PURPLE,
                Some(last_n),
            )
    }
}

/// Pool the forecast columns of `frame` into one [`Forecast`] and score it.
pub fn evaluate_frame(
    frame: &PanelFrame,
    alias: &str,
    levels: &[f64],
) -> Result<ForecastEvaluation> {
    let actual = frame.column(TARGET_COL)?;
    let mut forecast = Forecast::from_values(frame.column(alias)?.to_vec());
    for &level in levels {
        let l = format_level(level);
        forecast = forecast.with_interval(
            level,
            frame.column(&format!("{}-lo-{}", alias, l))?.to_vec(),
            frame.column(&format!("{}-hi-{}", alias, l))?.to_vec(),
        )?;
    }
    evaluate_forecast(actual, &forecast)
}

/// Run the full train / predict / reshape / plot sequence.
pub fn run_air_passengers(config: &WorkflowConfig) -> Result<WorkflowOutput> {
    if !config.levels.contains(&config.plot_level) {
        return Err(ForecastError::InvalidParameter(format!(
            "plot level {} is not among the trained levels {:?}",
            config.plot_level, config.levels
        )));
    }
    let panel = air_passengers_panel()?;
    let static_df = config.static_frame()?;
    let (train, test) = panel.train_test_split(config.horizon)?;
    info!(train_rows = train.len(), test_rows = test.len(), "split panel");

    let model = NBEATSx::new(config.model_config())?;
    let models: Vec<BoxedForecaster> = vec![Box::new(model)];
    let mut nf = NeuralForecast::new(models, Frequency::MonthEnd)?;
    let reports = nf.fit(&train, Some(&static_df), config.val_size)?;
    let alias = nf.aliases()[0].to_string();

    let predictions = nf.predict(Some(&test))?;
    let joined = test.hstack(&predictions)?;
    let plot_frame = train.vstack(&joined)?.filter_series(&config.series)?;

    let evaluation = evaluate_frame(&joined, &alias, &config.levels)?;
    info!(
        mae = evaluation.accuracy.mae,
        rmse = evaluation.accuracy.rmse,
        smape = evaluation.accuracy.smape,
        "test accuracy"
    );
    for c in &evaluation.coverage {
        info!(
            level = c.level,
            coverage = c.coverage,
            width = c.mean_width,
            "interval coverage"
        );
    }

    let output = WorkflowOutput {
        train,
        test,
        predictions,
        plot_frame,
        reports,
        evaluation,
        alias,
    };

    if let Some(path) = &config.csv_path {
        output.predictions.to_csv_path(path)?;
        info!(path = %path.display(), "wrote predictions");
    }
    if let Some(path) = &config.plot_path {
        output.plot(config.plot_level, config.horizon).save_svg(path)?;
        info!(path = %path.display(), "wrote plot");
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_reference_setup() {
        let c = WorkflowConfig::default().model_config();
        assert_eq!((c.h, c.input_size), (12, 24));
        assert_eq!(c.scaler_type, ScalerType::Robust);
        assert_eq!(c.stat_exog_list, vec!["airline1".to_string()]);
        assert_eq!(c.futr_exog_list, vec!["trend".to_string()]);
        assert_eq!(c.max_steps, 200);
        assert_eq!(c.val_check_steps, 10);
        assert_eq!(c.patience(), Some(2));
        assert_eq!(c.loss.output_columns("NBEATSx").len(), 6);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn json_overrides_keep_other_defaults() {
        let json = r#"{"max_steps": 5, "mlp_units": [[8, 8]]}"#;
        let c = WorkflowConfig::from_json_str(json).unwrap();
        assert_eq!(c.max_steps, 5);
        assert_eq!(c.model_config().mlp_units, vec![[8, 8]]);
        assert_eq!(c.levels, vec![80.0, 90.0]);
        assert!(matches!(
            WorkflowConfig::from_json_str("{"),
            Err(ForecastError::Parse(_))
        ));
    }

    #[test]
    fn static_covariates_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static.csv");
        std::fs::write(
            &path,
            "unique_id,airline1\nAirline1,1\nAirline2,0\nAirline3,1\n",
        )
        .unwrap();
        let c = WorkflowConfig {
            static_path: Some(path),
            ..Default::default()
        };
        let table = c.static_frame().unwrap();
        assert_eq!(table.get("Airline2", "airline1").unwrap(), 0.0);
        assert_eq!(table.ids().len(), 3);

        let default = WorkflowConfig::default().static_frame().unwrap();
        assert_eq!(default.get("Airline2", "airline1").unwrap(), 1.0);
        assert_eq!(default.get("Airline1", "airline1").unwrap(), 0.0);

        let missing = WorkflowConfig {
            static_path: Some(dir.path().join("absent.csv")),
            ..Default::default()
        };
        assert!(missing.static_frame().is_err());
    }

    #[test]
    fn static_table_must_cover_every_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static.csv");
        std::fs::write(&path, "unique_id,airline1\nAirline1,1\n").unwrap();
        let c = WorkflowConfig {
            static_path: Some(path),
            max_steps: 1,
            ..Default::default()
        };
        assert!(matches!(
            run_air_passengers(&c),
            Err(ForecastError::UnknownSeries(_))
        ));
    }

    #[test]
    fn plot_level_must_be_trained() {
        let c = WorkflowConfig {
            plot_level: 95.0,
            ..Default::default()
        };
        assert!(run_air_passengers(&c).is_err());
    }
}

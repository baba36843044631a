//! Fits a set of models on a panel and assembles their predictions.

use crate::core::{Frequency, PanelFrame, StaticFrame};
use crate::data::{ExogSpec, FutureExog, TimeSeriesDataset};
use crate::error::{ForecastError, Result};
use crate::models::{BoxedForecaster, TrainingReport};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::info;

/// Default target column.
pub const TARGET_COL: &str = "y";

/// Orchestrates training and prediction of several models on one panel.
///
/// # Example
/// ```
/// use anofox_neuralforecast::core::Frequency;
/// use anofox_neuralforecast::data::{air_passengers_panel, air_passengers_static};
/// use anofox_neuralforecast::models::{BoxedForecaster, NBEATSx, NBEATSxConfig};
/// use anofox_neuralforecast::NeuralForecast;
///
/// let panel = air_passengers_panel().unwrap();
/// let (train, test) = panel.train_test_split(12).unwrap();
///
/// let config = NBEATSxConfig::new(12, 24)
///     .with_mlp_units(vec![[16, 16]])
///     .with_futr_exog(&["trend"])
///     .with_max_steps(5);
/// let model: BoxedForecaster = Box::new(NBEATSx::new(config).unwrap());
///
/// let mut nf = NeuralForecast::new(vec![model], Frequency::MonthEnd).unwrap();
/// nf.fit(&train, Some(&air_passengers_static().unwrap()), 0).unwrap();
/// let y_hat = nf.predict(Some(&test)).unwrap();
/// assert_eq!(y_hat.len(), 24);
/// assert!(y_hat.has_column("NBEATSx"));
/// ```
pub struct NeuralForecast {
    models: Vec<BoxedForecaster>,
    freq: Frequency,
    target: String,
    dataset: Option<TimeSeriesDataset>,
    reports: Vec<TrainingReport>,
}

impl std::fmt::Debug for NeuralForecast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeuralForecast")
            .field("models", &self.aliases())
            .field("freq", &self.freq)
            .field("target", &self.target)
            .field("fitted", &self.dataset.is_some())
            .finish()
    }
}

impl NeuralForecast {
    /// Models must share one horizon and have distinct aliases.
    pub fn new(models: Vec<BoxedForecaster>, freq: Frequency) -> Result<Self> {
        let first = models.first().ok_or_else(|| {
            ForecastError::InvalidParameter("at least one model is required".to_string())
        })?;
        let h = first.horizon();
        let mut seen: Vec<&str> = Vec::new();
        for model in &models {
            if model.horizon() != h {
                return Err(ForecastError::InvalidParameter(format!(
                    "model '{}' has horizon {} but '{}' has {}",
                    model.alias(),
                    model.horizon(),
                    first.alias(),
                    h
                )));
            }
            if seen.contains(&model.alias()) {
                return Err(ForecastError::InvalidParameter(format!(
                    "duplicate model alias '{}'",
                    model.alias()
                )));
            }
            seen.push(model.alias());
        }
        Ok(Self {
            models,
            freq,
            target: TARGET_COL.to_string(),
            dataset: None,
            reports: Vec::new(),
        })
    }

    /// Use another column as the target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn models(&self) -> &[BoxedForecaster] {
        &self.models
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.alias()).collect()
    }

    pub fn freq(&self) -> Frequency {
        self.freq
    }

    pub fn horizon(&self) -> usize {
        self.models.first().map(|m| m.horizon()).unwrap_or(0)
    }

    pub fn is_fitted(&self) -> bool {
        self.dataset.is_some()
    }

    /// Reports of the last `fit`, in model order.
    pub fn reports(&self) -> &[TrainingReport] {
        &self.reports
    }

    /// Exogenous columns needed by any model.
    pub fn exog_union(&self) -> ExogSpec {
        self.models
            .iter()
            .fold(ExogSpec::default(), |acc, m| acc.union(&m.exog_lists()))
    }

    /// Train every model on `df`, validating on the last `val_size` steps.
    ///
    /// A failed fit leaves the forecaster unfitted, even if it was fitted before.
    pub fn fit(
        &mut self,
        df: &PanelFrame,
        static_df: Option<&StaticFrame>,
        val_size: usize,
    ) -> Result<Vec<TrainingReport>> {
        self.dataset = None;
        self.reports.clear();
        let exog = self.exog_union();
        let dataset = TimeSeriesDataset::from_panel(df, static_df, &self.target, &exog)?;
        info!(
            series = dataset.n_series(),
            rows = df.len(),
            models = self.models.len(),
            val_size,
            "fitting models"
        );

        let mut reports = Vec::with_capacity(self.models.len());
        for model in self.models.iter_mut() {
            reports.push(model.fit(&dataset, val_size)?);
        }
        self.dataset = Some(dataset);
        self.reports = reports.clone();
        Ok(reports)
    }

    /// `(unique_id, ds)` of the rows `predict` will return.
    pub fn make_future_dataframe(&self) -> Result<PanelFrame> {
        let dataset = self.dataset.as_ref().ok_or(ForecastError::FitRequired)?;
        let h = self.horizon();
        let mut ids = Vec::with_capacity(dataset.n_series() * h);
        let mut dates = Vec::with_capacity(dataset.n_series() * h);
        for s in dataset.series() {
            let last = s.last_date().ok_or(ForecastError::EmptyData)?;
            for d in self.freq.range(last, h)? {
                ids.push(s.id.clone());
                dates.push(d);
            }
        }
        PanelFrame::new(ids, dates, Vec::new())
    }

    /// Forecast `h` steps past the end of every training series.
    ///
    /// `futr_df` supplies the future exogenous covariates; it is only
    /// required when a model uses them. Its target values are never read.
    pub fn predict(&self, futr_df: Option<&PanelFrame>) -> Result<PanelFrame> {
        let dataset = self.dataset.as_ref().ok_or(ForecastError::FitRequired)?;
        let futr = self.future_exog(dataset, futr_df)?;
        let mut frame = self.make_future_dataframe()?;

        for model in &self.models {
            let forecasts = model.predict(dataset, &futr)?;
            let names = model.output_columns();
            let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(frame.len()); names.len()];
            for forecast in &forecasts {
                let cols = forecast.to_columns(model.alias());
                if cols.len() != names.len() {
                    return Err(ForecastError::DimensionMismatch {
                        expected: names.len(),
                        got: cols.len(),
                    });
                }
                for (target, (_, values)) in columns.iter_mut().zip(cols) {
                    target.extend(values);
                }
            }
            for (name, values) in names.into_iter().zip(columns) {
                frame.add_column(name, values)?;
            }
        }

        info!(rows = frame.len(), columns = frame.columns().len(), "prediction frame ready");
        Ok(frame)
    }

    fn future_exog(
        &self,
        dataset: &TimeSeriesDataset,
        futr_df: Option<&PanelFrame>,
    ) -> Result<FutureExog> {
        let columns = dataset.exog().futr.clone();
        let mut futr = FutureExog::new(columns.clone());
        if columns.is_empty() {
            return Ok(futr);
        }
        let df = futr_df.ok_or_else(|| {
            ForecastError::MissingColumn(format!(
                "futr_df is required for future exogenous {:?}",
                columns
            ))
        })?;
        let values = columns
            .iter()
            .map(|c| df.column(c))
            .collect::<Result<Vec<_>>>()?;

        let mut rows: HashMap<(&str, NaiveDate), usize> = HashMap::with_capacity(df.len());
        for (r, (id, ds)) in df.ids().iter().zip(df.dates()).enumerate() {
            rows.insert((id.as_str(), *ds), r);
        }

        let h = self.horizon();
        for s in dataset.series() {
            let last = s.last_date().ok_or(ForecastError::EmptyData)?;
            let dates = self.freq.range(last, h)?;
            let mut per_channel = vec![Vec::with_capacity(h); columns.len()];
            for d in dates {
                let r = *rows.get(&(s.id.as_str(), d)).ok_or_else(|| {
                    ForecastError::SchemaMismatch(format!(
                        "futr_df has no row for ({}, {})",
                        s.id, d
                    ))
                })?;
                for (c, column) in values.iter().enumerate() {
                    if !column[r].is_finite() {
                        return Err(ForecastError::MissingValues(columns[c].clone()));
                    }
                    per_channel[c].push(column[r]);
                }
            }
            futr.insert(s.id.clone(), per_channel)?;
        }
        Ok(futr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NBEATSx, NBEATSxConfig};

    fn model(alias: &str, h: usize) -> BoxedForecaster {
        let cfg = NBEATSxConfig::new(h, 4)
            .with_mlp_units(vec![[8, 8]])
            .with_max_steps(3)
            .with_alias(alias);
        Box::new(NBEATSx::new(cfg).unwrap())
    }

    fn panel() -> PanelFrame {
        let start = NaiveDate::from_ymd_opt(2021, 1, 31).unwrap();
        let mut dates = vec![start];
        dates.extend(Frequency::MonthEnd.range(start, 19).unwrap());
        let mut ids = vec!["x".to_string(); 20];
        ids.extend(vec!["w".to_string(); 20]);
        let mut all_dates = dates.clone();
        all_dates.extend(dates);
        PanelFrame::builder()
            .ids(ids)
            .dates(all_dates)
            .column("y", (0..40).map(|i| (i % 12) as f64).collect())
            .column("t", (0..40).map(|i| i as f64).collect())
            .build()
            .unwrap()
    }

    #[test]
    fn new_rejects_duplicates_and_mixed_horizons() {
        let me = Frequency::MonthEnd;
        assert!(NeuralForecast::new(vec![], me).is_err());
        assert!(NeuralForecast::new(vec![model("a", 2), model("a", 2)], me).is_err());
        assert!(NeuralForecast::new(vec![model("a", 2), model("b", 3)], me).is_err());
        assert!(NeuralForecast::new(vec![model("a", 2), model("b", 2)], me).is_ok());
    }

    #[test]
    fn predict_requires_fit() {
        let nf = NeuralForecast::new(vec![model("a", 2)], Frequency::MonthEnd).unwrap();
        assert_eq!(nf.predict(None).unwrap_err(), ForecastError::FitRequired);
        assert_eq!(nf.make_future_dataframe().unwrap_err(), ForecastError::FitRequired);
    }

    #[test]
    fn predictions_are_sorted_and_dated_after_training() {
        let mut nf =
            NeuralForecast::new(vec![model("a", 2), model("b", 2)], Frequency::MonthEnd).unwrap();
        nf.fit(&panel(), None, 0).unwrap();
        let y_hat = nf.predict(None).unwrap();

        assert_eq!(y_hat.len(), 4);
        assert_eq!(y_hat.ids()[0], "w");
        assert_eq!(y_hat.ids()[3], "x");
        assert_eq!(y_hat.dates()[0], NaiveDate::from_ymd_opt(2022, 9, 30).unwrap());
        assert_eq!(y_hat.dates()[1], NaiveDate::from_ymd_opt(2022, 10, 31).unwrap());
        assert_eq!(y_hat.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(nf.reports().len(), 2);
    }

    #[test]
    fn future_exog_must_cover_horizon() {
        let cfg = NBEATSxConfig::new(2, 4)
            .with_mlp_units(vec![[8, 8]])
            .with_futr_exog(&["t"])
            .with_max_steps(2);
        let mut nf = NeuralForecast::new(
            vec![Box::new(NBEATSx::new(cfg).unwrap()) as BoxedForecaster],
            Frequency::MonthEnd,
        )
        .unwrap();
        let (train, test) = panel().sorted().unwrap().train_test_split(2).unwrap();
        nf.fit(&train, None, 0).unwrap();

        assert!(matches!(nf.predict(None), Err(ForecastError::MissingColumn(_))));
        let short = test.tail_per_series(1);
        assert!(matches!(
            nf.predict(Some(&short)),
            Err(ForecastError::SchemaMismatch(_))
        ));
        let y_hat = nf.predict(Some(&test)).unwrap();
        assert_eq!(y_hat.len(), 4);
    }
}

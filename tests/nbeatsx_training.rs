//! Integration tests for training NBEATSx through the `NeuralForecast` API.

use anofox_neuralforecast::core::{Frequency, PanelFrame};
use anofox_neuralforecast::models::{
    BoxedForecaster, Distribution, Loss, NBEATSx, NBEATSxConfig, StackType,
};
use anofox_neuralforecast::transform::ScalerType;
use anofox_neuralforecast::{ForecastError, NeuralForecast};
use chrono::{Duration, NaiveDate};

const H: usize = 7;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

fn promo(t: usize) -> f64 {
    if t % 7 == 5 {
        1.0
    } else {
        0.0
    }
}

/// Two daily series with a weekly cycle, a promotion spike and a noisy
/// historical covariate. `n` observed rows per series plus `extra` rows of
/// future covariates only.
fn panel(n: usize, extra: usize) -> (PanelFrame, PanelFrame) {
    let mut ids = Vec::new();
    let mut dates = Vec::new();
    let mut y = Vec::new();
    let mut x = Vec::new();
    let mut p = Vec::new();
    let mut f_ids = Vec::new();
    let mut f_dates = Vec::new();
    let mut f_p = Vec::new();
    for (id, level) in [("store_1", 50.0), ("store_2", 80.0)] {
        for t in 0..n + extra {
            let d = start() + Duration::days(t as i64);
            if t < n {
                let season = 5.0 * (2.0 * std::f64::consts::PI * t as f64 / 7.0).sin();
                ids.push(id.to_string());
                dates.push(d);
                y.push(level + season + 10.0 * promo(t));
                x.push(((t * 37) % 11) as f64 / 11.0);
                p.push(promo(t));
            } else {
                f_ids.push(id.to_string());
                f_dates.push(d);
                f_p.push(promo(t));
            }
        }
    }
    let df = PanelFrame::builder()
        .ids(ids)
        .dates(dates)
        .column("y", y)
        .column("x", x)
        .column("promo", p)
        .build()
        .unwrap();
    let futr = PanelFrame::builder()
        .ids(f_ids)
        .dates(f_dates)
        .column("promo", f_p)
        .build()
        .unwrap();
    (df, futr)
}

fn boxed(model: NBEATSx) -> Vec<BoxedForecaster> {
    vec![Box::new(model)]
}

fn base() -> NBEATSxConfig {
    NBEATSxConfig::new(H, 14)
        .with_mlp_units(vec![[16, 16]])
        .with_batch_size(16)
        .with_max_steps(20)
}

#[test]
fn several_models_share_one_prediction_frame() {
    let (df, _) = panel(70, 0);
    let models: Vec<BoxedForecaster> = vec![
        Box::new(NBEATSx::new(base().with_alias("point")).unwrap()),
        Box::new(NBEATSx::new(base().with_loss(Loss::mq(vec![80.0])).with_alias("mq")).unwrap()),
    ];
    let mut nf = NeuralForecast::new(models, Frequency::Daily).unwrap();
    assert_eq!(nf.aliases(), vec!["point", "mq"]);

    let reports = nf.fit(&df, None, 0).unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].model, "mq");
    assert!(nf.is_fitted());

    let out = nf.predict(None).unwrap();
    assert_eq!(out.len(), 2 * H);
    let expected: Vec<String> = ["point", "mq", "mq-median", "mq-lo-80", "mq-hi-80"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(out.columns(), expected.as_slice());
    assert_eq!(out.dates()[0], start() + Duration::days(70));
    assert_eq!(out.dates()[H - 1], start() + Duration::days(70 + H as i64 - 1));
    // the MQ point column is its median
    assert_eq!(out.column("mq").unwrap(), out.column("mq-median").unwrap());
}

#[test]
fn orchestrator_rejects_inconsistent_models() {
    let same_alias: Vec<BoxedForecaster> = vec![
        Box::new(NBEATSx::new(base()).unwrap()),
        Box::new(NBEATSx::new(base()).unwrap()),
    ];
    assert!(matches!(
        NeuralForecast::new(same_alias, Frequency::Daily),
        Err(ForecastError::InvalidParameter(_))
    ));

    let horizons: Vec<BoxedForecaster> = vec![
        Box::new(NBEATSx::new(base().with_alias("a")).unwrap()),
        Box::new(NBEATSx::new(NBEATSxConfig::new(3, 6).with_alias("b")).unwrap()),
    ];
    assert!(NeuralForecast::new(horizons, Frequency::Daily).is_err());
    assert!(NeuralForecast::new(Vec::new(), Frequency::Daily).is_err());
}

#[test]
fn predict_before_fit_fails() {
    let nf = NeuralForecast::new(boxed(NBEATSx::new(base()).unwrap()), Frequency::Daily)
        .unwrap();
    assert!(matches!(nf.predict(None), Err(ForecastError::FitRequired)));
}

#[test]
fn exogenous_stack_uses_future_covariates() {
    let (df, futr) = panel(84, H);
    let config = base()
        .with_loss(Loss::distribution(Distribution::StudentT, vec![90.0]))
        .with_scaler(ScalerType::Standard)
        .with_hist_exog(&["x"])
        .with_futr_exog(&["promo"])
        .with_stacks(
            vec![StackType::Identity, StackType::Trend, StackType::Exogenous],
            1,
        )
        .with_max_steps(30)
        .with_val_check_steps(10);
    let mut nf =
        NeuralForecast::new(boxed(NBEATSx::new(config).unwrap()), Frequency::Daily)
            .unwrap();
    let reports = nf.fit(&df, None, H).unwrap();
    assert_eq!(reports[0].valid_loss.len(), 3);

    let out = nf.predict(Some(&futr)).unwrap();
    assert_eq!(out.len(), 2 * H);
    let lo = out.column("NBEATSx-lo-90").unwrap();
    let hi = out.column("NBEATSx-hi-90").unwrap();
    let mean = out.column("NBEATSx").unwrap();
    for r in 0..out.len() {
        assert!(mean[r].is_finite());
        assert!(lo[r] <= mean[r] && mean[r] <= hi[r]);
    }

    // covariates cut one day short
    let short = futr.tail_per_series(H - 1);
    assert!(nf.predict(Some(&short)).is_err());
}

#[test]
fn point_valid_loss_with_distribution_training() {
    let (df, _) = panel(60, 0);
    let config = base()
        .with_loss(Loss::distribution(Distribution::Normal, vec![80.0]))
        .with_valid_loss(Loss::Mae)
        .with_val_check_steps(5)
        .with_early_stop_patience(2);
    let mut nf =
        NeuralForecast::new(boxed(NBEATSx::new(config).unwrap()), Frequency::Daily)
            .unwrap();
    let report = &nf.fit(&df, None, H).unwrap()[0];
    assert!(!report.valid_loss.is_empty());
    assert!(report.valid_loss.iter().all(|(_, l)| l.is_finite() && *l >= 0.0));

    let bad = base()
        .with_loss(Loss::Mae)
        .with_valid_loss(Loss::mq(vec![80.0]));
    assert!(NBEATSx::new(bad).is_err());
}

#[test]
fn missing_target_values_are_rejected() {
    let (df, _) = panel(40, 0);
    let mut y = df.column("y").unwrap().to_vec();
    y[3] = f64::NAN;
    let broken = PanelFrame::new(
        df.ids().to_vec(),
        df.dates().to_vec(),
        vec![("y".to_string(), y)],
    )
    .unwrap();
    let mut nf = NeuralForecast::new(boxed(NBEATSx::new(base()).unwrap()), Frequency::Daily)
        .unwrap();
    assert!(matches!(
        nf.fit(&broken, None, 0),
        Err(ForecastError::MissingValues(_))
    ));
}

/// Copy of `df` (series of `n` rows each) with the target mapped per time index.
fn map_target(df: &PanelFrame, n: usize, f: impl Fn(usize, f64) -> f64) -> PanelFrame {
    let y: Vec<f64> = df
        .column("y")
        .unwrap()
        .iter()
        .enumerate()
        .map(|(r, v)| f(r % n, *v))
        .collect();
    PanelFrame::new(
        df.ids().to_vec(),
        df.dates().to_vec(),
        vec![("y".to_string(), y)],
    )
    .unwrap()
}

fn raw_mse() -> NBEATSxConfig {
    base()
        .with_loss(Loss::Mse)
        .with_scaler(ScalerType::Identity)
}

#[test]
fn overflowing_training_loss_is_an_error() {
    let (df, _) = panel(40, 0);
    let huge = map_target(&df, 40, |_, y| y * 1e200);
    let mut nf = NeuralForecast::new(boxed(NBEATSx::new(raw_mse()).unwrap()), Frequency::Daily)
        .unwrap();
    match nf.fit(&huge, None, 0) {
        Err(ForecastError::ComputationError(msg)) => {
            assert!(msg.contains("training loss at step 1"), "{}", msg)
        }
        other => panic!("expected a computation error, got {:?}", other),
    }
    assert!(!nf.is_fitted());
}

#[test]
fn overflowing_validation_loss_is_an_error() {
    // only the validation tail overflows; training windows never reach it
    let (df, _) = panel(40, 0);
    let tail = map_target(&df, 40, |t, y| if t >= 40 - H { y * 1e200 } else { y });
    let config = raw_mse().with_max_steps(3).with_val_check_steps(1);
    let mut nf = NeuralForecast::new(boxed(NBEATSx::new(config).unwrap()), Frequency::Daily)
        .unwrap();
    match nf.fit(&tail, None, H) {
        Err(ForecastError::ComputationError(msg)) => {
            assert!(msg.contains("validation loss at step 1"), "{}", msg)
        }
        other => panic!("expected a computation error, got {:?}", other),
    }

    // the same series without validation trains fine
    assert!(nf.fit(&df, None, H).is_ok());
}

#[test]
fn failed_refit_leaves_forecaster_unfitted() {
    let (df, _) = panel(40, 0);
    let models: Vec<BoxedForecaster> = vec![
        Box::new(
            NBEATSx::new(base().with_scaler(ScalerType::Robust).with_alias("robust")).unwrap(),
        ),
        Box::new(NBEATSx::new(raw_mse().with_alias("raw")).unwrap()),
    ];
    let mut nf = NeuralForecast::new(models, Frequency::Daily).unwrap();
    nf.fit(&df, None, 0).unwrap();
    assert!(nf.is_fitted());
    assert_eq!(nf.reports().len(), 2);
    assert!(nf.predict(None).is_ok());

    // "robust" refits, "raw" overflows
    let huge = map_target(&df, 40, |_, y| y * 1e200);
    assert!(matches!(
        nf.fit(&huge, None, 0),
        Err(ForecastError::ComputationError(_))
    ));
    assert!(!nf.is_fitted());
    assert!(nf.reports().is_empty());
    assert!(matches!(nf.predict(None), Err(ForecastError::FitRequired)));
    assert!(matches!(
        nf.make_future_dataframe(),
        Err(ForecastError::FitRequired)
    ));
}

//! Property-based tests for panel handling, scaling and forecast construction.
//!
//! These tests verify invariants that should hold for all valid inputs,
//! using randomly generated panels and network outputs.

use anofox_neuralforecast::core::{Frequency, PanelFrame};
use anofox_neuralforecast::models::{Distribution, Loss};
use anofox_neuralforecast::transform::{ScaleStats, ScalerType};
use chrono::{Datelike, Duration, NaiveDate};
use ndarray::Array2;
use proptest::prelude::*;

/// Panel of `values.len()` series stacked one after another on a shared daily calendar.
fn make_panel(values: &[Vec<f64>]) -> PanelFrame {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut ids = Vec::new();
    let mut dates = Vec::new();
    let mut y = Vec::new();
    for (s, series) in values.iter().enumerate() {
        for (t, v) in series.iter().enumerate() {
            ids.push(format!("s{}", s));
            dates.push(start + Duration::days(t as i64));
            y.push(*v);
        }
    }
    PanelFrame::builder()
        .ids(ids)
        .dates(dates)
        .column("y", y)
        .build()
        .unwrap()
}

/// Strategy for a panel of 1..4 series sharing one length.
fn panel_strategy() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (1usize..4, 5usize..40).prop_flat_map(|(k, n)| {
        prop::collection::vec(prop::collection::vec(-1000.0..1000.0_f64, n), k)
    })
}

fn scaler_strategy() -> impl Strategy<Value = ScalerType> {
    prop_oneof![
        Just(ScalerType::Identity),
        Just(ScalerType::Standard),
        Just(ScalerType::Robust),
        Just(ScalerType::MinMax),
        Just(ScalerType::MinMax1),
    ]
}

// =============================================================================
// Property: train/test split partitions every series at one cutoff
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn split_partitions_each_series(values in panel_strategy(), frac in 0.05..0.95_f64) {
        let n = values[0].len();
        let h = ((n as f64 * frac) as usize).clamp(1, n);
        let panel = make_panel(&values);
        let (train, test) = panel.train_test_split(h).unwrap();

        prop_assert_eq!(train.len() + test.len(), panel.len());
        for count in test.len_per_series().values() {
            prop_assert_eq!(*count, h);
        }
        let last_train = train.dates().iter().max();
        let first_test = test.dates().iter().min().unwrap();
        if let Some(last) = last_train {
            prop_assert!(last < first_test);
        }
    }

    #[test]
    fn vstack_then_filter_recovers_series(values in panel_strategy()) {
        let panel = make_panel(&values);
        let (train, test) = panel.train_test_split(1).unwrap();
        let joined = train.vstack(&test).unwrap();
        prop_assert_eq!(joined.len(), panel.len());
        let first = joined.filter_series("s0").unwrap();
        prop_assert_eq!(first.len(), values[0].len());
    }
}

// =============================================================================
// Property: scaling statistics are usable for any finite window
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn scale_is_positive_and_invertible(
        values in prop::collection::vec(-1e4..1e4_f64, 1..50),
        scaler in scaler_strategy()
    ) {
        let mask = vec![1.0; values.len()];
        let stats = scaler.fit(&values, &mask);
        prop_assert!(stats.scale > 0.0 && stats.scale.is_finite());
        for &v in &values {
            let back = stats.inverse(stats.transform(v));
            prop_assert!((back - v).abs() <= 1e-8 * (1.0 + v.abs()));
        }
    }

    #[test]
    fn constant_windows_keep_unit_scale(value in -1e3..1e3_f64, len in 1usize..20) {
        let values = vec![value; len];
        let mask = vec![1.0; len];
        for scaler in [ScalerType::Standard, ScalerType::Robust, ScalerType::MinMax] {
            prop_assert_eq!(scaler.fit(&values, &mask).scale, 1.0);
        }
    }
}

// =============================================================================
// Property: prediction intervals are nested around the point forecast
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn mq_quantiles_are_monotone(raw in prop::collection::vec(-5.0..5.0_f64, 5 * 3)) {
        let loss = Loss::mq(vec![80.0, 90.0]);
        let outputs: Vec<Array2<f64>> = raw
            .chunks(3)
            .map(|c| Array2::from_shape_vec((1, 3), c.to_vec()).unwrap())
            .collect();
        let f = loss.forecast_row(&outputs, 0, ScaleStats::new(10.0, 2.0)).unwrap();
        let median = f.median().unwrap();
        let i80 = f.interval(80.0).unwrap();
        let i90 = f.interval(90.0).unwrap();
        for t in 0..3 {
            prop_assert!(i90.lower[t] <= i80.lower[t]);
            prop_assert!(i80.lower[t] <= median[t]);
            prop_assert!(median[t] <= i80.upper[t]);
            prop_assert!(i80.upper[t] <= i90.upper[t]);
        }
    }

    #[test]
    fn distribution_intervals_are_nested(
        loc in -10.0..10.0_f64,
        raw_scale in -8.0..8.0_f64,
        raw_df in -5.0..5.0_f64,
        student in any::<bool>()
    ) {
        let (distribution, mut outputs) = if student {
            (Distribution::StudentT, vec![Array2::from_elem((1, 2), raw_df)])
        } else {
            (Distribution::Normal, Vec::new())
        };
        outputs.insert(0, Array2::from_elem((1, 2), raw_scale));
        outputs.insert(0, Array2::from_elem((1, 2), loc));

        let loss = Loss::distribution(distribution, vec![50.0, 80.0, 95.0]);
        let f = loss.forecast_row(&outputs, 0, ScaleStats::IDENTITY).unwrap();
        let levels = [50.0, 80.0, 95.0];
        for t in 0..2 {
            for w in levels.windows(2) {
                let inner = f.interval(w[0]).unwrap();
                let outer = f.interval(w[1]).unwrap();
                prop_assert!(outer.lower[t] < inner.lower[t]);
                prop_assert!(inner.upper[t] < outer.upper[t]);
            }
            prop_assert!((f.primary()[t] - loc).abs() < 1e-12);
        }
    }
}

// =============================================================================
// Property: month-end calendars stay on month ends
// =============================================================================

proptest! {
    #[test]
    fn month_end_advance_lands_on_month_end(
        year in 1950i32..2100,
        month in 1u32..=12,
        n in 1u32..40,
    ) {
        let first_next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .unwrap();
        let end = first_next - Duration::days(1);
        let next = Frequency::MonthEnd.advance(end, n).unwrap();
        prop_assert_eq!((next + Duration::days(1)).day(), 1);
        let months = (next.year() - end.year()) * 12 + next.month() as i32 - end.month() as i32;
        prop_assert_eq!(months, n as i32);
    }

    #[test]
    fn month_end_advance_counts_the_roll_forward(
        year in 1950i32..2100,
        month in 1u32..=12,
        day in 1u32..=27,
        n in 1u32..40,
    ) {
        let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
        let next = Frequency::MonthEnd.advance(date, n).unwrap();
        prop_assert_eq!((next + Duration::days(1)).day(), 1);
        let months = (next.year() - date.year()) * 12 + next.month() as i32 - date.month() as i32;
        prop_assert_eq!(months, n as i32 - 1);
    }
}

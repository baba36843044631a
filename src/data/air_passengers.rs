//! The AirPassengers dataset arranged as a two-series panel.
//!
//! Monthly international airline passengers (thousands), January 1949 to
//! December 1960. `Airline2` is the same series shifted up by 300 so that the
//! panel has two levels that a static dummy can tell apart.

use crate::core::{Frequency, PanelFrame, StaticFrame};
use crate::error::Result;
use chrono::NaiveDate;

const AIR_PASSENGERS: [f64; 144] = [
    112.0, 118.0, 132.0, 129.0, 121.0, 135.0, 148.0, 148.0, 136.0, 119.0, 104.0, 118.0, //
    115.0, 126.0, 141.0, 135.0, 125.0, 149.0, 170.0, 170.0, 158.0, 133.0, 114.0, 140.0, //
    145.0, 150.0, 178.0, 163.0, 172.0, 178.0, 199.0, 199.0, 184.0, 162.0, 146.0, 166.0, //
    171.0, 180.0, 193.0, 181.0, 183.0, 218.0, 230.0, 242.0, 209.0, 191.0, 172.0, 194.0, //
    196.0, 196.0, 236.0, 235.0, 229.0, 243.0, 264.0, 272.0, 237.0, 211.0, 180.0, 201.0, //
    204.0, 188.0, 235.0, 227.0, 234.0, 264.0, 302.0, 293.0, 259.0, 229.0, 203.0, 229.0, //
    242.0, 233.0, 267.0, 269.0, 270.0, 315.0, 364.0, 347.0, 312.0, 274.0, 237.0, 278.0, //
    284.0, 277.0, 317.0, 313.0, 318.0, 374.0, 413.0, 405.0, 355.0, 306.0, 271.0, 306.0, //
    315.0, 301.0, 356.0, 348.0, 355.0, 422.0, 465.0, 467.0, 404.0, 347.0, 305.0, 336.0, //
    340.0, 318.0, 362.0, 348.0, 363.0, 435.0, 491.0, 505.0, 404.0, 359.0, 310.0, 337.0, //
    360.0, 342.0, 406.0, 396.0, 420.0, 472.0, 548.0, 559.0, 463.0, 407.0, 362.0, 405.0, //
    417.0, 391.0, 419.0, 461.0, 472.0, 535.0, 622.0, 606.0, 508.0, 461.0, 390.0, 432.0,
];

/// Offset added to the second airline.
pub const AIRLINE2_OFFSET: f64 = 300.0;

/// The 144 monthly passenger totals.
pub fn air_passengers() -> Vec<f64> {
    AIR_PASSENGERS.to_vec()
}

/// Month-end dates starting at 1949-01-31.
pub fn air_passengers_dates() -> Result<Vec<NaiveDate>> {
    let first = NaiveDate::from_ymd_opt(1949, 1, 31)
        .ok_or_else(|| crate::ForecastError::TimestampError("invalid start date".to_string()))?;
    let mut dates = vec![first];
    dates.extend(Frequency::MonthEnd.range(first, AIR_PASSENGERS.len() - 1)?);
    Ok(dates)
}

/// Panel with columns `y`, `trend` and `y_[lag12]` for `Airline1` and `Airline2`.
///
/// `trend` counts rows over the whole stacked panel (0..288); `y_[lag12]` is the
/// per-series value twelve months earlier, `NaN` for the first year.
pub fn air_passengers_panel() -> Result<PanelFrame> {
    let dates = air_passengers_dates()?;
    let n = AIR_PASSENGERS.len();

    let mut ids = Vec::with_capacity(2 * n);
    let mut ds = Vec::with_capacity(2 * n);
    let mut y = Vec::with_capacity(2 * n);
    let mut lag12 = Vec::with_capacity(2 * n);
    for (id, offset) in [("Airline1", 0.0), ("Airline2", AIRLINE2_OFFSET)] {
        for t in 0..n {
            ids.push(id.to_string());
            ds.push(dates[t]);
            y.push(AIR_PASSENGERS[t] + offset);
            lag12.push(if t >= 12 {
                AIR_PASSENGERS[t - 12] + offset
            } else {
                f64::NAN
            });
        }
    }
    let trend = (0..2 * n).map(|i| i as f64).collect();

    PanelFrame::builder()
        .ids(ids)
        .dates(ds)
        .column("y", y)
        .column("trend", trend)
        .column("y_[lag12]", lag12)
        .build()
}

/// Static dummies: `airline1` is 1 for `Airline2`, `airline2` is 1 for `Airline1`.
pub fn air_passengers_static() -> Result<StaticFrame> {
    StaticFrame::new(vec!["airline1".to_string(), "airline2".to_string()])
        .with_row("Airline1", vec![0.0, 1.0])?
        .with_row("Airline2", vec![1.0, 0.0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_has_two_aligned_series() {
        let panel = air_passengers_panel().unwrap();
        assert_eq!(panel.len(), 288);
        assert_eq!(panel.unique_ids(), vec!["Airline1", "Airline2"]);
        assert_eq!(panel.dates()[0], NaiveDate::from_ymd_opt(1949, 1, 31).unwrap());
        assert_eq!(panel.dates()[143], NaiveDate::from_ymd_opt(1960, 12, 31).unwrap());
        assert_eq!(panel.dates()[144], panel.dates()[0]);

        let y = panel.column("y").unwrap();
        assert_eq!(y[0], 112.0);
        assert_eq!(y[144], 412.0);
        assert_eq!(panel.column("trend").unwrap()[287], 287.0);
    }

    #[test]
    fn lag_column_is_per_series() {
        let panel = air_passengers_panel().unwrap();
        let lag = panel.column("y_[lag12]").unwrap();
        assert!(lag[11].is_nan());
        assert_eq!(lag[12], 112.0);
        assert!(lag[144].is_nan());
        assert_eq!(lag[156], 412.0);
    }

    #[test]
    fn static_table_matches_panel() {
        let panel = air_passengers_panel().unwrap();
        let stat = air_passengers_static().unwrap();
        stat.validate_against(&panel).unwrap();
        assert_eq!(stat.get("Airline2", "airline1").unwrap(), 1.0);
    }
}

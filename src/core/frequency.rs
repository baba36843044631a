//! Calendar frequencies used to extend a panel into the future.

use crate::error::{ForecastError, Result};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Step between consecutive timestamps of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Daily,
    Weekly,
    /// First day of each month.
    MonthStart,
    /// Last day of each month.
    MonthEnd,
    /// Last day of March, June, September and December.
    QuarterEnd,
    /// December 31st.
    YearEnd,
    /// A fixed number of days.
    Fixed(i64),
}

impl Frequency {
    /// Parse a pandas-style offset alias (`D`, `W`, `MS`, `M`, `ME`, `Q`, `QE`, `Y`, `YE`).
    pub fn from_alias(alias: &str) -> Result<Self> {
        match alias.trim() {
            "D" => Ok(Frequency::Daily),
            "W" => Ok(Frequency::Weekly),
            "MS" => Ok(Frequency::MonthStart),
            "M" | "ME" => Ok(Frequency::MonthEnd),
            "Q" | "QE" => Ok(Frequency::QuarterEnd),
            "Y" | "YE" | "A" => Ok(Frequency::YearEnd),
            other => Err(ForecastError::InvalidParameter(format!(
                "unsupported frequency alias '{}'",
                other
            ))),
        }
    }

    /// Move `date` forward by `n` periods.
    ///
    /// Calendar frequencies are anchored. A date off its anchor first rolls
    /// forward to the next anchor, which counts as one period, so
    /// `QuarterEnd.advance(2024-01-31, 1)` is 2024-03-31.
    pub fn advance(&self, date: NaiveDate, n: u32) -> Result<NaiveDate> {
        let out = match self {
            Frequency::Daily => date.checked_add_signed(Duration::days(n as i64)),
            Frequency::Weekly => date.checked_add_signed(Duration::weeks(n as i64)),
            Frequency::Fixed(days) => {
                if *days <= 0 {
                    return Err(ForecastError::InvalidParameter(
                        "fixed frequency must be a positive number of days".to_string(),
                    ));
                }
                date.checked_add_signed(Duration::days(days * n as i64))
            }
            Frequency::MonthStart => {
                let (y, m, k) = if date.day() == 1 {
                    (date.year(), date.month(), n)
                } else {
                    let (y, m) = shift_month(date.year(), date.month(), 1);
                    (y, m, n.saturating_sub(1))
                };
                let (y, m) = shift_month(y, m, k);
                NaiveDate::from_ymd_opt(y, m, 1)
            }
            Frequency::MonthEnd => {
                let anchor = last_day_of_month(date.year(), date.month());
                let k = steps_past_anchor(date, anchor, n);
                let (y, m) = shift_month(date.year(), date.month(), k);
                last_day_of_month(y, m)
            }
            Frequency::QuarterEnd => {
                let quarter_month = (date.month() + 2) / 3 * 3;
                let anchor = last_day_of_month(date.year(), quarter_month);
                let k = steps_past_anchor(date, anchor, n);
                let (y, m) = shift_month(date.year(), quarter_month, 3 * k);
                last_day_of_month(y, m)
            }
            Frequency::YearEnd => {
                let anchor = last_day_of_month(date.year(), 12);
                let k = steps_past_anchor(date, anchor, n);
                last_day_of_month(date.year() + k as i32, 12)
            }
        };
        out.ok_or_else(|| {
            ForecastError::TimestampError(format!("cannot advance {} by {} periods", date, n))
        })
    }

    /// The `n` dates strictly after `start`.
    pub fn range(&self, start: NaiveDate, n: usize) -> Result<Vec<NaiveDate>> {
        (1..=n).map(|i| self.advance(start, i as u32)).collect()
    }
}

/// Periods left to move past `anchor`, the period end containing `date`.
fn steps_past_anchor(date: NaiveDate, anchor: Option<NaiveDate>, n: u32) -> u32 {
    if anchor == Some(date) {
        n
    } else {
        n.saturating_sub(1)
    }
}

fn shift_month(year: i32, month: u32, n: u32) -> (i32, u32) {
    let zero_based = (month - 1) + n;
    (year + (zero_based / 12) as i32, zero_based % 12 + 1)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (ny, nm) = shift_month(year, month, 1);
    NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()
}

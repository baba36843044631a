//! Windowed training data built from a panel.
//!
//! A [`TimeSeriesDataset`] holds one contiguous array per series and channel.
//! Models never see the panel directly: they draw [`Window`]s, which are turned
//! into dense [`Batch`]es of shape `[batch, time, channel]`.

use crate::core::{PanelFrame, StaticFrame};
use crate::error::{ForecastError, Result};
use crate::transform::{ScaleStats, ScalerType};
use chrono::NaiveDate;
use ndarray::{Array2, Array3};
use rand::Rng;
use std::collections::HashMap;

/// Names of the exogenous columns a model consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExogSpec {
    /// Known only up to the forecast origin.
    pub hist: Vec<String>,
    /// Known over the forecast horizon as well.
    pub futr: Vec<String>,
    /// One value per series.
    pub stat: Vec<String>,
}

impl ExogSpec {
    pub fn is_empty(&self) -> bool {
        self.hist.is_empty() && self.futr.is_empty() && self.stat.is_empty()
    }

    /// Merge two specs, keeping first-seen order and dropping duplicates.
    pub fn union(&self, other: &ExogSpec) -> ExogSpec {
        fn merge(a: &[String], b: &[String]) -> Vec<String> {
            let mut out = a.to_vec();
            for name in b {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            out
        }
        ExogSpec {
            hist: merge(&self.hist, &other.hist),
            futr: merge(&self.futr, &other.futr),
            stat: merge(&self.stat, &other.stat),
        }
    }
}

/// Positions of a model's exogenous columns inside a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    pub hist: Vec<usize>,
    pub futr: Vec<usize>,
    pub stat: Vec<usize>,
}

/// Arrays of one series, sorted by date.
#[derive(Debug, Clone)]
pub struct SeriesData {
    pub id: String,
    pub dates: Vec<NaiveDate>,
    pub y: Vec<f64>,
    /// hist_exog[channel][t]
    pub hist_exog: Vec<Vec<f64>>,
    /// futr_exog[channel][t]
    pub futr_exog: Vec<Vec<f64>>,
    pub stat_exog: Vec<f64>,
}

impl SeriesData {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// All series of a panel, ready for window extraction.
#[derive(Debug, Clone)]
pub struct TimeSeriesDataset {
    series: Vec<SeriesData>,
    target: String,
    exog: ExogSpec,
}

impl TimeSeriesDataset {
    /// Build a dataset from a long-format panel.
    ///
    /// Rows are sorted by `(unique_id, ds)`. Every listed column must exist and
    /// be free of missing values; static columns are read from `static_df`.
    pub fn from_panel(
        panel: &PanelFrame,
        static_df: Option<&StaticFrame>,
        target: &str,
        exog: &ExogSpec,
    ) -> Result<Self> {
        if panel.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        let panel = panel.sorted()?;

        let y_all = panel.column(target)?;
        let hist_all = exog
            .hist
            .iter()
            .map(|c| panel.column(c))
            .collect::<Result<Vec<_>>>()?;
        let futr_all = exog
            .futr
            .iter()
            .map(|c| panel.column(c))
            .collect::<Result<Vec<_>>>()?;

        if y_all.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::MissingValues(target.to_string()));
        }
        for (name, values) in exog
            .hist
            .iter()
            .zip(&hist_all)
            .chain(exog.futr.iter().zip(&futr_all))
        {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(ForecastError::MissingValues(name.clone()));
            }
        }

        if !exog.stat.is_empty() {
            let stat = static_df.ok_or_else(|| {
                ForecastError::MissingColumn(format!(
                    "static_df is required for static exogenous {:?}",
                    exog.stat
                ))
            })?;
            stat.validate_against(&panel)?;
        }

        let mut series: Vec<SeriesData> = Vec::new();
        let ids = panel.ids();
        let dates = panel.dates();
        let mut start = 0;
        while start < panel.len() {
            let mut end = start + 1;
            while end < panel.len() && ids[end] == ids[start] {
                end += 1;
            }
            let id = ids[start].clone();
            let stat_exog = match static_df {
                Some(stat) if !exog.stat.is_empty() => stat.row(&id, &exog.stat)?,
                _ => Vec::new(),
            };
            series.push(SeriesData {
                dates: dates[start..end].to_vec(),
                y: y_all[start..end].to_vec(),
                hist_exog: hist_all.iter().map(|c| c[start..end].to_vec()).collect(),
                futr_exog: futr_all.iter().map(|c| c[start..end].to_vec()).collect(),
                stat_exog,
                id,
            });
            start = end;
        }

        Ok(Self {
            series,
            target: target.to_string(),
            exog: exog.clone(),
        })
    }

    pub fn series(&self) -> &[SeriesData] {
        &self.series
    }

    pub fn n_series(&self) -> usize {
        self.series.len()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn exog(&self) -> &ExogSpec {
        &self.exog
    }

    /// Length of the longest series.
    pub fn max_len(&self) -> usize {
        self.series.iter().map(|s| s.len()).max().unwrap_or(0)
    }

    /// Resolve a model's exogenous columns to channel positions.
    pub fn channel_map(&self, wanted: &ExogSpec) -> Result<ChannelMap> {
        fn positions(have: &[String], want: &[String]) -> Result<Vec<usize>> {
            want.iter()
                .map(|w| {
                    have.iter()
                        .position(|h| h == w)
                        .ok_or_else(|| ForecastError::MissingColumn(w.clone()))
                })
                .collect()
        }
        Ok(ChannelMap {
            hist: positions(&self.exog.hist, &wanted.hist)?,
            futr: positions(&self.exog.futr, &wanted.futr)?,
            stat: positions(&self.exog.stat, &wanted.stat)?,
        })
    }

    /// Gather windows into dense arrays.
    ///
    /// Steps before the start of a series are zero with mask 0. Steps after its
    /// end have mask 0 for the target and take future exogenous values from
    /// `future`, which must then cover them.
    pub fn batch(
        &self,
        windows: &[Window],
        layout: &WindowLayout,
        future: Option<&FutureExog>,
    ) -> Result<Batch> {
        let b = windows.len();
        let l = layout.input_size;
        let h = layout.h;
        let map = &layout.channels;

        let mut batch = Batch {
            insample_y: Array2::zeros((b, l)),
            insample_mask: Array2::zeros((b, l)),
            outsample_y: Array2::zeros((b, h)),
            outsample_mask: Array2::zeros((b, h)),
            hist_exog: Array3::zeros((b, l, map.hist.len())),
            futr_exog: Array3::zeros((b, l + h, map.futr.len())),
            stat_exog: Array2::zeros((b, map.stat.len())),
        };

        for (row, window) in windows.iter().enumerate() {
            let s = self.series.get(window.series).ok_or(ForecastError::IndexOutOfBounds {
                index: window.series,
                size: self.series.len(),
            })?;
            let n = s.len() as isize;
            let origin = window.cutoff as isize;
            let future_values = if map.futr.is_empty() {
                None
            } else {
                future.and_then(|f| f.get(&s.id))
            };

            for k in 0..(l + h) {
                let t = origin - l as isize + k as isize;
                let observed = t >= 0 && t < n;

                if k < l {
                    if observed {
                        let t = t as usize;
                        batch.insample_y[[row, k]] = s.y[t];
                        batch.insample_mask[[row, k]] = 1.0;
                        for (c, &ch) in map.hist.iter().enumerate() {
                            batch.hist_exog[[row, k, c]] = s.hist_exog[ch][t];
                        }
                    }
                } else if observed {
                    batch.outsample_y[[row, k - l]] = s.y[t as usize];
                    batch.outsample_mask[[row, k - l]] = 1.0;
                }

                for (c, &ch) in map.futr.iter().enumerate() {
                    let value = if t < 0 {
                        0.0
                    } else if observed {
                        s.futr_exog[ch][t as usize]
                    } else {
                        let step = (t - n) as usize;
                        future_values
                            .and_then(|v| v.get(ch))
                            .and_then(|v| v.get(step))
                            .copied()
                            .ok_or_else(|| {
                                ForecastError::SchemaMismatch(format!(
                                    "no future value of '{}' for series '{}' at step {}",
                                    self.exog.futr[ch],
                                    s.id,
                                    step + 1
                                ))
                            })?
                    };
                    batch.futr_exog[[row, k, c]] = value;
                }
            }

            for (c, &ch) in map.stat.iter().enumerate() {
                batch.stat_exog[[row, c]] = s.stat_exog[ch];
            }
        }

        Ok(batch)
    }
}

/// A forecast origin inside one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Index of the series in the dataset.
    pub series: usize,
    /// Index of the first forecast step.
    pub cutoff: usize,
}

/// Shape of the windows a model consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowLayout {
    pub input_size: usize,
    pub h: usize,
    pub channels: ChannelMap,
}

/// Enumerates training and validation windows and samples from them.
#[derive(Debug, Clone)]
pub struct WindowSampler {
    train: Vec<Window>,
    valid: Vec<Window>,
}

impl WindowSampler {
    /// Enumerate windows for every series.
    ///
    /// Training targets end before the last `val_size` observations of a
    /// series. Validation origins lie in `[len - val_size, len - h]`.
    pub fn new(
        dataset: &TimeSeriesDataset,
        input_size: usize,
        h: usize,
        val_size: usize,
        step_size: usize,
        start_padding_enabled: bool,
    ) -> Result<Self> {
        if step_size == 0 {
            return Err(ForecastError::InvalidParameter(
                "step_size must be positive".to_string(),
            ));
        }
        if val_size > 0 && val_size < h {
            return Err(ForecastError::InvalidParameter(format!(
                "val_size ({}) must be at least the horizon ({})",
                val_size, h
            )));
        }
        let min_cutoff = if start_padding_enabled { 1 } else { input_size };

        let mut train = Vec::new();
        let mut valid = Vec::new();
        for (idx, s) in dataset.series().iter().enumerate() {
            let len = s.len();
            if len >= val_size + h {
                let last = len - val_size - h;
                let mut c = min_cutoff;
                while c <= last {
                    train.push(Window { series: idx, cutoff: c });
                    c += step_size;
                }
            }
            if val_size > 0 && len >= val_size {
                let mut c = len - val_size;
                while c + h <= len {
                    if c >= min_cutoff {
                        valid.push(Window { series: idx, cutoff: c });
                    }
                    c += step_size;
                }
            }
        }

        if train.is_empty() {
            return Err(ForecastError::InsufficientData {
                needed: min_cutoff + h + val_size,
                got: dataset.max_len(),
            });
        }
        if val_size > 0 && valid.is_empty() {
            return Err(ForecastError::InsufficientData {
                needed: min_cutoff + val_size,
                got: dataset.max_len(),
            });
        }

        Ok(Self { train, valid })
    }

    pub fn train_windows(&self) -> &[Window] {
        &self.train
    }

    pub fn valid_windows(&self) -> &[Window] {
        &self.valid
    }

    /// Draw `n` training windows uniformly with replacement.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<Window> {
        (0..n)
            .map(|_| self.train[rng.gen_range(0..self.train.len())])
            .collect()
    }
}

/// Future values of the dataset's future exogenous channels, per series.
#[derive(Debug, Clone, Default)]
pub struct FutureExog {
    columns: Vec<String>,
    /// values[id][channel][step]
    values: HashMap<String, Vec<Vec<f64>>>,
}

impl FutureExog {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            values: HashMap::new(),
        }
    }

    /// No future covariates at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn insert(&mut self, id: impl Into<String>, values: Vec<Vec<f64>>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.columns.len(),
                got: values.len(),
            });
        }
        self.values.insert(id.into(), values);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&[Vec<f64>]> {
        self.values.get(id).map(|v| v.as_slice())
    }
}

/// Dense window arrays for one forward pass.
#[derive(Debug, Clone)]
pub struct Batch {
    /// [batch, input_size]
    pub insample_y: Array2<f64>,
    pub insample_mask: Array2<f64>,
    /// [batch, h]
    pub outsample_y: Array2<f64>,
    pub outsample_mask: Array2<f64>,
    /// [batch, input_size, hist channels]
    pub hist_exog: Array3<f64>,
    /// [batch, input_size + h, futr channels]
    pub futr_exog: Array3<f64>,
    /// [batch, static channels]
    pub stat_exog: Array2<f64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.insample_y.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize every window in place and return the target statistics.
    ///
    /// The target and each temporal exogenous channel get their own
    /// statistics, computed from the observed insample steps.
    pub fn scale(&mut self, scaler: ScalerType) -> Vec<ScaleStats> {
        let l = self.insample_y.ncols();
        let mut y_stats = Vec::with_capacity(self.len());

        for row in 0..self.len() {
            let mask: Vec<f64> = self.insample_mask.row(row).to_vec();
            let insample: Vec<f64> = self.insample_y.row(row).to_vec();
            let stats = scaler.fit(&insample, &mask);
            for k in 0..l {
                self.insample_y[[row, k]] = if mask[k] > 0.0 {
                    stats.transform(self.insample_y[[row, k]])
                } else {
                    0.0
                };
            }
            self.outsample_y
                .row_mut(row)
                .mapv_inplace(|v| stats.transform(v));
            y_stats.push(stats);

            for c in 0..self.hist_exog.shape()[2] {
                let values: Vec<f64> = (0..l).map(|k| self.hist_exog[[row, k, c]]).collect();
                let s = scaler.fit(&values, &mask);
                for k in 0..l {
                    if mask[k] > 0.0 {
                        self.hist_exog[[row, k, c]] = s.transform(values[k]);
                    }
                }
            }

            let total = self.futr_exog.shape()[1];
            for c in 0..self.futr_exog.shape()[2] {
                let values: Vec<f64> = (0..l).map(|k| self.futr_exog[[row, k, c]]).collect();
                let s = scaler.fit(&values, &mask);
                for k in 0..total {
                    if k >= l || mask[k] > 0.0 {
                        self.futr_exog[[row, k, c]] = s.transform(self.futr_exog[[row, k, c]]);
                    }
                }
            }
        }

        y_stats
    }
}

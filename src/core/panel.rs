//! Long-format panel data: many series stacked as `(unique_id, ds, columns...)` rows.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

/// Name of the series identifier column.
pub const ID_COL: &str = "unique_id";
/// Name of the timestamp column.
pub const DS_COL: &str = "ds";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A panel of time series in long format.
///
/// Every row carries a series identifier, a date and one value per named
/// numeric column. Missing cells are stored as `NaN`.
///
/// # Example
/// ```
/// use anofox_neuralforecast::core::PanelFrame;
/// use chrono::NaiveDate;
///
/// let d = |m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap();
/// let panel = PanelFrame::builder()
///     .ids(vec!["a".into(), "a".into(), "b".into(), "b".into()])
///     .dates(vec![d(1), d(2), d(1), d(2)])
///     .column("y", vec![1.0, 2.0, 10.0, 20.0])
///     .build()
///     .unwrap();
///
/// let (train, test) = panel.train_test_split(2).unwrap();
/// assert_eq!(train.len(), 2);
/// assert_eq!(test.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PanelFrame {
    ids: Vec<String>,
    dates: Vec<NaiveDate>,
    names: Vec<String>,
    /// Column-major values: columns[c][row]
    columns: Vec<Vec<f64>>,
}

/// Builder for constructing a [`PanelFrame`].
#[derive(Debug, Clone, Default)]
pub struct PanelFrameBuilder {
    ids: Vec<String>,
    dates: Vec<NaiveDate>,
    columns: Vec<(String, Vec<f64>)>,
}

impl PanelFrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = ids;
        self
    }

    pub fn dates(mut self, dates: Vec<NaiveDate>) -> Self {
        self.dates = dates;
        self
    }

    pub fn column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.push((name.into(), values));
        self
    }

    pub fn build(self) -> Result<PanelFrame> {
        PanelFrame::new(self.ids, self.dates, self.columns)
    }
}

impl PanelFrame {
    /// Create a panel, validating that every column has one value per row.
    pub fn new(
        ids: Vec<String>,
        dates: Vec<NaiveDate>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self> {
        if ids.len() != dates.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: ids.len(),
                got: dates.len(),
            });
        }

        let mut frame = PanelFrame {
            ids,
            dates,
            names: Vec::with_capacity(columns.len()),
            columns: Vec::with_capacity(columns.len()),
        };
        for (name, values) in columns {
            frame.add_column(name, values)?;
        }
        Ok(frame)
    }

    /// Start building a panel.
    pub fn builder() -> PanelFrameBuilder {
        PanelFrameBuilder::new()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Series identifier of every row.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Date of every row.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Names of the numeric columns, in order.
    pub fn columns(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Values of a numeric column.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
    }

    /// Append a numeric column.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if name == ID_COL || name == DS_COL {
            return Err(ForecastError::SchemaMismatch(format!(
                "'{}' is reserved",
                name
            )));
        }
        if self.has_column(&name) {
            return Err(ForecastError::SchemaMismatch(format!(
                "duplicate column '{}'",
                name
            )));
        }
        if values.len() != self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Series identifiers in order of first appearance.
    pub fn unique_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    /// Number of rows for each series.
    pub fn len_per_series(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for id in &self.ids {
            *counts.entry(id.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Build a new frame from the given row indices.
    pub(crate) fn take(&self, rows: &[usize]) -> PanelFrame {
        PanelFrame {
            ids: rows.iter().map(|&r| self.ids[r].clone()).collect(),
            dates: rows.iter().map(|&r| self.dates[r]).collect(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| rows.iter().map(|&r| col[r]).collect())
                .collect(),
        }
    }

    /// Copy of the frame sorted by `(unique_id, ds)`.
    ///
    /// Fails if a series has two rows with the same date.
    pub fn sorted(&self) -> Result<PanelFrame> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            self.ids[a]
                .cmp(&self.ids[b])
                .then(self.dates[a].cmp(&self.dates[b]))
        });
        for w in order.windows(2) {
            if self.ids[w[0]] == self.ids[w[1]] && self.dates[w[0]] == self.dates[w[1]] {
                return Err(ForecastError::TimestampError(format!(
                    "duplicate date {} for series '{}'",
                    self.dates[w[0]], self.ids[w[0]]
                )));
            }
        }
        Ok(self.take(&order))
    }

    /// Date found `n` rows from the end of the `ds` column.
    ///
    /// On a panel stacked series by series on a shared calendar this is the
    /// first of the last `n` periods.
    pub fn cutoff_for_last(&self, n: usize) -> Result<NaiveDate> {
        if n == 0 {
            return Err(ForecastError::InvalidParameter(
                "number of held-out periods must be positive".to_string(),
            ));
        }
        if n > self.len() {
            return Err(ForecastError::InsufficientData {
                needed: n,
                got: self.len(),
            });
        }
        Ok(self.dates[self.len() - n])
    }

    /// Partition rows into `ds < cutoff` and `ds >= cutoff`, preserving order.
    pub fn split_at(&self, cutoff: NaiveDate) -> (PanelFrame, PanelFrame) {
        let (train, test): (Vec<usize>, Vec<usize>) =
            (0..self.len()).partition(|&r| self.dates[r] < cutoff);
        (self.take(&train), self.take(&test))
    }

    /// Hold out the last `n` periods of the panel.
    pub fn train_test_split(&self, n: usize) -> Result<(PanelFrame, PanelFrame)> {
        let cutoff = self.cutoff_for_last(n)?;
        Ok(self.split_at(cutoff))
    }

    /// The latest `n` rows of each series, in original row order.
    pub fn tail_per_series(&self, n: usize) -> PanelFrame {
        let mut by_series: HashMap<&str, Vec<usize>> = HashMap::new();
        for (r, id) in self.ids.iter().enumerate() {
            by_series.entry(id.as_str()).or_default().push(r);
        }
        let mut keep = Vec::new();
        for rows in by_series.values_mut() {
            rows.sort_by_key(|&r| self.dates[r]);
            let start = rows.len().saturating_sub(n);
            keep.extend_from_slice(&rows[start..]);
        }
        keep.sort_unstable();
        self.take(&keep)
    }

    /// Only the rows of one series.
    pub fn filter_series(&self, id: &str) -> Result<PanelFrame> {
        let rows: Vec<usize> = (0..self.len()).filter(|&r| self.ids[r] == id).collect();
        if rows.is_empty() {
            return Err(ForecastError::UnknownSeries(id.to_string()));
        }
        Ok(self.take(&rows))
    }

    /// Copy without the named numeric columns.
    pub fn drop_columns(&self, names: &[&str]) -> Result<PanelFrame> {
        for name in names {
            if !self.has_column(name) {
                return Err(ForecastError::MissingColumn(name.to_string()));
            }
        }
        let keep: Vec<&str> = self
            .names
            .iter()
            .map(|n| n.as_str())
            .filter(|n| !names.contains(n))
            .collect();
        self.select_columns(&keep)
    }

    /// Copy with only the named numeric columns, in the given order.
    pub fn select_columns(&self, names: &[&str]) -> Result<PanelFrame> {
        let mut out = PanelFrame {
            ids: self.ids.clone(),
            dates: self.dates.clone(),
            names: Vec::with_capacity(names.len()),
            columns: Vec::with_capacity(names.len()),
        };
        for name in names {
            out.add_column(*name, self.column(name)?.to_vec())?;
        }
        Ok(out)
    }

    /// Concatenate columns of two frames describing the same rows.
    ///
    /// Both frames must list the same `(unique_id, ds)` pairs in the same order.
    pub fn hstack(&self, other: &PanelFrame) -> Result<PanelFrame> {
        if self.len() != other.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: other.len(),
            });
        }
        for r in 0..self.len() {
            if self.ids[r] != other.ids[r] || self.dates[r] != other.dates[r] {
                return Err(ForecastError::SchemaMismatch(format!(
                    "row {} is ({}, {}) on the left and ({}, {}) on the right",
                    r, self.ids[r], self.dates[r], other.ids[r], other.dates[r]
                )));
            }
        }
        let mut out = self.clone();
        for (name, values) in other.names.iter().zip(&other.columns) {
            out.add_column(name.clone(), values.clone())?;
        }
        Ok(out)
    }

    /// Append the rows of `other` below this frame.
    ///
    /// The result carries the union of both column sets; absent cells are `NaN`.
    pub fn vstack(&self, other: &PanelFrame) -> Result<PanelFrame> {
        let mut names = self.names.clone();
        for name in &other.names {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        let mut ids = self.ids.clone();
        ids.extend_from_slice(&other.ids);
        let mut dates = self.dates.clone();
        dates.extend_from_slice(&other.dates);

        let fill = |frame: &PanelFrame, name: &str| -> Vec<f64> {
            match frame.column(name) {
                Ok(values) => values.to_vec(),
                Err(_) => vec![f64::NAN; frame.len()],
            }
        };
        let columns = names
            .into_iter()
            .map(|name| {
                let mut values = fill(self, &name);
                values.extend(fill(other, &name));
                (name, values)
            })
            .collect();
        PanelFrame::new(ids, dates, columns)
    }

    /// Read a panel from CSV with header `unique_id,ds,<columns...>`.
    ///
    /// Empty cells are read as `NaN`.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<PanelFrame> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        let id_pos = header_position(&headers, ID_COL)?;
        let ds_pos = header_position(&headers, DS_COL)?;
        let value_cols: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_pos && *i != ds_pos)
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut ids = Vec::new();
        let mut dates = Vec::new();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); value_cols.len()];
        for record in rdr.records() {
            let record = record?;
            ids.push(record.get(id_pos).unwrap_or_default().to_string());
            dates.push(parse_date(record.get(ds_pos).unwrap_or_default())?);
            for (slot, (pos, name)) in value_cols.iter().enumerate() {
                columns[slot].push(parse_cell(record.get(*pos).unwrap_or_default(), name)?);
            }
        }

        PanelFrame::new(
            ids,
            dates,
            value_cols
                .into_iter()
                .map(|(_, name)| name)
                .zip(columns)
                .collect(),
        )
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<PanelFrame> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Write the panel as CSV; `NaN` cells are written empty.
    pub fn to_csv_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec![ID_COL.to_string(), DS_COL.to_string()];
        header.extend(self.names.iter().cloned());
        wtr.write_record(&header)?;
        for r in 0..self.len() {
            let mut row = Vec::with_capacity(header.len());
            row.push(self.ids[r].clone());
            row.push(self.dates[r].format(DATE_FORMAT).to_string());
            for col in &self.columns {
                row.push(format_cell(col[r]));
            }
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.to_csv_writer(file)
    }
}

fn header_position(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    // Accept full timestamps by keeping only the date part.
    let date_part = raw.split([' ', 'T']).next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
        .map_err(|e| ForecastError::Parse(format!("invalid date '{}': {}", raw, e)))
}

pub(crate) fn parse_cell(raw: &str, column: &str) -> Result<f64> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|e| {
        ForecastError::Parse(format!("invalid value '{}' in column '{}': {}", raw, column, e))
    })
}

pub(crate) fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

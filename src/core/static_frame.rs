//! Per-series static covariates.

use crate::core::panel::{parse_cell, PanelFrame, ID_COL};
use crate::error::{ForecastError, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Static (time-invariant) covariates keyed by series identifier.
#[derive(Debug, Clone, Default)]
pub struct StaticFrame {
    columns: Vec<String>,
    rows: HashMap<String, Vec<f64>>,
    order: Vec<String>,
}

impl StaticFrame {
    /// Create an empty table with the given covariate columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Add or replace the covariates of one series.
    pub fn with_row(mut self, id: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.insert(id, values)?;
        Ok(self)
    }

    pub fn insert(&mut self, id: impl Into<String>, values: Vec<f64>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.columns.len(),
                got: values.len(),
            });
        }
        let id = id.into();
        if !self.rows.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.rows.insert(id, values);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Series identifiers in insertion order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    /// One covariate of one series.
    pub fn get(&self, id: &str, column: &str) -> Result<f64> {
        let row = self
            .rows
            .get(id)
            .ok_or_else(|| ForecastError::UnknownSeries(id.to_string()))?;
        let pos = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| ForecastError::MissingColumn(column.to_string()))?;
        Ok(row[pos])
    }

    /// Selected covariates of one series, in the order requested.
    pub fn row(&self, id: &str, columns: &[String]) -> Result<Vec<f64>> {
        columns.iter().map(|c| self.get(id, c)).collect()
    }

    /// Check that every series of `panel` has a static row. Rows for series
    /// absent from `panel` are ignored.
    pub fn validate_against(&self, panel: &PanelFrame) -> Result<()> {
        for id in panel.unique_ids() {
            if !self.contains(&id) {
                return Err(ForecastError::UnknownSeries(format!(
                    "'{}' has no row in the static table",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Read a static table from CSV with header `unique_id,<columns...>`.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<StaticFrame> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        let id_pos = headers
            .iter()
            .position(|h| h == ID_COL)
            .ok_or_else(|| ForecastError::MissingColumn(ID_COL.to_string()))?;
        let value_cols: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_pos)
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut frame = StaticFrame::new(value_cols.iter().map(|(_, n)| n.clone()).collect());
        for record in rdr.records() {
            let record = record?;
            let values = value_cols
                .iter()
                .map(|(pos, name)| parse_cell(record.get(*pos).unwrap_or_default(), name))
                .collect::<Result<Vec<f64>>>()?;
            frame.insert(record.get(id_pos).unwrap_or_default(), values)?;
        }
        Ok(frame)
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<StaticFrame> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }
}

//! SVG line charts of a forecast against the observed series.
//!
//! # Example
//!
//! ```
//! use anofox_neuralforecast::core::PanelFrame;
//! use anofox_neuralforecast::plot::{QuantilePlot, PURPLE};
//! use chrono::NaiveDate;
//! use plotters::style::BLACK;
//!
//! let d = |m| NaiveDate::from_ymd_opt(2024, m, 28).unwrap();
//! let frame = PanelFrame::builder()
//!     .ids(vec!["a".into(); 4])
//!     .dates(vec![d(1), d(2), d(3), d(4)])
//!     .column("y", vec![1.0, 2.0, 3.0, 4.0])
//!     .column("mean", vec![f64::NAN, f64::NAN, 2.8, 4.1])
//!     .column("lo", vec![f64::NAN, f64::NAN, 2.0, 3.0])
//!     .column("hi", vec![f64::NAN, f64::NAN, 3.5, 5.0])
//!     .build()
//!     .unwrap();
//!
//! let svg = QuantilePlot::new(&frame)
//!     .truth("y", "True", BLACK)
//!     .line("mean", "mean", PURPLE)
//!     .band("lo", "hi", "level 90", PURPLE, Some(2))
//!     .render_svg()
//!     .unwrap();
//! assert!(svg.starts_with("<svg"));
//! ```

use crate::core::PanelFrame;
use crate::error::{ForecastError, Result};
use chrono::{Duration, NaiveDate};
use plotters::prelude::*;
use std::path::Path;

pub const PURPLE: RGBColor = RGBColor(128, 0, 128);

#[derive(Debug, Clone)]
struct LineSpec {
    column: String,
    label: String,
    color: RGBColor,
    width: u32,
}

#[derive(Debug, Clone)]
struct BandSpec {
    lower: String,
    upper: String,
    label: String,
    color: RGBColor,
    last_n: Option<usize>,
}

/// Line chart of one series with forecast paths and shaded intervals.
#[derive(Debug, Clone)]
pub struct QuantilePlot<'a> {
    frame: &'a PanelFrame,
    lines: Vec<LineSpec>,
    bands: Vec<BandSpec>,
    title: String,
    y_desc: String,
    width: u32,
    height: u32,
    grid: bool,
}

fn plot_err<E: std::fmt::Display>(e: E) -> ForecastError {
    ForecastError::Plot(e.to_string())
}

impl<'a> QuantilePlot<'a> {
    pub fn new(frame: &'a PanelFrame) -> Self {
        Self {
            frame,
            lines: Vec::new(),
            bands: Vec::new(),
            title: String::new(),
            y_desc: "Target [y]".to_string(),
            width: 1000,
            height: 500,
            grid: true,
        }
    }

    /// Observed values, drawn with a thicker stroke.
    pub fn truth(mut self, column: &str, label: &str, color: RGBColor) -> Self {
        self.lines.push(LineSpec {
            column: column.to_string(),
            label: label.to_string(),
            color,
            width: 2,
        });
        self
    }

    pub fn line(mut self, column: &str, label: &str, color: RGBColor) -> Self {
        self.lines.push(LineSpec {
            column: column.to_string(),
            label: label.to_string(),
            color,
            width: 1,
        });
        self
    }

    /// Shade between two columns, over the last `last_n` rows when given.
    pub fn band(
        mut self,
        lower: &str,
        upper: &str,
        label: &str,
        color: RGBColor,
        last_n: Option<usize>,
    ) -> Self {
        self.bands.push(BandSpec {
            lower: lower.to_string(),
            upper: upper.to_string(),
            label: label.to_string(),
            color,
            last_n,
        });
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn y_desc(mut self, desc: &str) -> Self {
        self.y_desc = desc.to_string();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn grid(mut self, grid: bool) -> Self {
        self.grid = grid;
        self
    }

    fn origin(&self) -> Result<NaiveDate> {
        self.frame
            .dates()
            .iter()
            .min()
            .copied()
            .ok_or(ForecastError::EmptyData)
    }

    fn x_values(&self, origin: NaiveDate) -> Vec<f64> {
        self.frame
            .dates()
            .iter()
            .map(|d| (*d - origin).num_days() as f64)
            .collect()
    }

    fn band_rows(&self, band: &BandSpec) -> std::ops::Range<usize> {
        let n = self.frame.len();
        match band.last_n {
            Some(k) => n.saturating_sub(k)..n,
            None => 0..n,
        }
    }

    /// Finite `(x, y)` points of a column.
    fn points(&self, xs: &[f64], column: &str) -> Result<Vec<(f64, f64)>> {
        let ys = self.frame.column(column)?;
        Ok(xs
            .iter()
            .zip(ys)
            .filter(|(_, y)| y.is_finite())
            .map(|(x, y)| (*x, *y))
            .collect())
    }

    fn y_range(&self) -> Result<(f64, f64)> {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        let mut visit = |v: f64| {
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        };
        for line in &self.lines {
            self.frame.column(&line.column)?.iter().for_each(|&v| visit(v));
        }
        for band in &self.bands {
            let rows = self.band_rows(band);
            self.frame.column(&band.lower)?[rows.clone()].iter().for_each(|&v| visit(v));
            self.frame.column(&band.upper)?[rows].iter().for_each(|&v| visit(v));
        }
        if !lo.is_finite() {
            return Err(ForecastError::Plot("nothing to draw".to_string()));
        }
        let pad = ((hi - lo) * 0.05).max(1e-6);
        Ok((lo - pad, hi + pad))
    }

    /// Render the chart as an SVG document.
    pub fn render_svg(&self) -> Result<String> {
        if self.frame.unique_ids().len() > 1 {
            return Err(ForecastError::InvalidParameter(
                "plot expects a frame with a single series".to_string(),
            ));
        }
        let origin = self.origin()?;
        let xs = self.x_values(origin);
        let x_max = xs.iter().copied().fold(0.0, f64::max).max(1.0);
        let (y_min, y_max) = self.y_range()?;

        let mut svg = String::new();
        {
            let root =
                SVGBackend::with_string(&mut svg, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE).map_err(plot_err)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(&self.title, ("sans-serif", 24))
                .margin(20)
                .x_label_area_size(40)
                .y_label_area_size(60)
                .build_cartesian_2d(0.0..x_max, y_min..y_max)
                .map_err(plot_err)?;

            let date_label = |x: &f64| {
                (origin + Duration::days(x.round() as i64))
                    .format("%Y-%m")
                    .to_string()
            };
            let mut mesh = chart.configure_mesh();
            if !self.grid {
                mesh.disable_mesh();
            }
            mesh.x_label_formatter(&date_label)
                .x_desc("Timestamp [t]")
                .y_desc(&self.y_desc)
                .draw()
                .map_err(plot_err)?;

            for band in &self.bands {
                let rows = self.band_rows(band);
                let lower = &self.frame.column(&band.lower)?[rows.clone()];
                let upper = &self.frame.column(&band.upper)?[rows.clone()];
                let x = &xs[rows];
                let mut polygon: Vec<(f64, f64)> = x
                    .iter()
                    .zip(upper)
                    .filter(|(_, v)| v.is_finite())
                    .map(|(x, v)| (*x, *v))
                    .collect();
                polygon.extend(
                    x.iter()
                        .zip(lower)
                        .rev()
                        .filter(|(_, v)| v.is_finite())
                        .map(|(x, v)| (*x, *v)),
                );
                if polygon.len() < 3 {
                    continue;
                }
                let color = band.color;
                chart
                    .draw_series(std::iter::once(Polygon::new(polygon, color.mix(0.4).filled())))
                    .map_err(plot_err)?
                    .label(band.label.as_str())
                    .legend(move |(x, y)| {
                        Rectangle::new([(x, y - 5), (x + 20, y + 5)], color.mix(0.4).filled())
                    });
            }

            for line in &self.lines {
                let color = line.color;
                chart
                    .draw_series(LineSeries::new(
                        self.points(&xs, &line.column)?,
                        color.stroke_width(line.width),
                    ))
                    .map_err(plot_err)?
                    .label(line.label.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }

            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(plot_err)?;
            root.present().map_err(plot_err)?;
        }
        Ok(svg)
    }

    pub fn save_svg(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.render_svg()?)?;
        Ok(())
    }
}

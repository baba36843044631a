//! Core data structures for panel forecasting.

mod forecast;
mod frequency;
mod panel;
mod static_frame;

pub use forecast::{format_level, Forecast, PredictionInterval};
pub use frequency::Frequency;
pub use panel::{PanelFrame, PanelFrameBuilder, DS_COL, ID_COL};
pub use static_frame::StaticFrame;

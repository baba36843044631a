//! Bundled datasets and the windowed training dataset.

pub mod air_passengers;
pub mod dataset;

pub use air_passengers::{
    air_passengers, air_passengers_panel, air_passengers_static, AIRLINE2_OFFSET,
};
pub use dataset::{
    Batch, ChannelMap, ExogSpec, FutureExog, SeriesData, TimeSeriesDataset, Window, WindowLayout,
    WindowSampler,
};

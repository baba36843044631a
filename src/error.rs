//! Error types for the anofox-neuralforecast library.

use thiserror::Error;

/// Result type alias for forecast operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur while preparing panels, training models or plotting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Timestamp-related error.
    #[error("timestamp error: {0}")]
    TimestampError(String),

    /// Model has not been fitted yet.
    #[error("model must be fitted before prediction")]
    FitRequired,

    /// Missing values detected when not allowed.
    #[error("missing values detected in column '{0}'")]
    MissingValues(String),

    /// Index out of bounds.
    #[error("index out of bounds: {index} (size: {size})")]
    IndexOutOfBounds { index: usize, size: usize },

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),

    /// A required column is absent from a frame.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// A series identifier is not present where it is required.
    #[error("unknown series: {0}")]
    UnknownSeries(String),

    /// Two frames cannot be combined.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Reading or writing a file failed.
    #[error("io error: {0}")]
    Io(String),

    /// A cell or a config document could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Rendering a chart failed.
    #[error("plot error: {0}")]
    Plot(String),
}

impl From<std::io::Error> for ForecastError {
    fn from(err: std::io::Error) -> Self {
        ForecastError::Io(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ForecastError::EmptyData;
        assert_eq!(err.to_string(), "empty input data");

        let err = ForecastError::InsufficientData { needed: 36, got: 20 };
        assert_eq!(
            err.to_string(),
            "insufficient data: need at least 36, got 20"
        );

        let err = ForecastError::MissingColumn("trend".to_string());
        assert_eq!(err.to_string(), "missing column: trend");

        let err = ForecastError::UnknownSeries("Airline3".to_string());
        assert_eq!(err.to_string(), "unknown series: Airline3");

        let err = ForecastError::MissingValues("y".to_string());
        assert_eq!(err.to_string(), "missing values detected in column 'y'");

        let err = ForecastError::FitRequired;
        assert_eq!(err.to_string(), "model must be fitted before prediction");
    }

    #[test]
    fn io_errors_convert_to_strings() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: ForecastError = io.into();
        assert!(matches!(err, ForecastError::Io(ref msg) if msg.contains("no such file")));
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = ForecastError::SchemaMismatch("rows differ".to_string());
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}

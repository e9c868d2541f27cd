//! Unified error type for the forecasting service.
//!
//! Variants map onto the error taxonomy the service exposes: input errors
//! reject synchronously at submission, upstream/fit errors fail the owning
//! task, cache errors are logged and never fail anything, and internal
//! errors are recovered at the task-worker boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad geometry, date range, or other request shape problem.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Requested forecast horizon is out of range.
    #[error("invalid periods: {0}")]
    InvalidPeriods(String),

    /// The data provider failed or returned an unusable series.
    #[error("upstream data error: {0}")]
    UpstreamData(String),

    /// No finite observations remained after cleaning the input series.
    #[error("no valid observations in input series")]
    NoValidData,

    /// The series is too short for the requested model order.
    #[error("insufficient history: {0}")]
    InsufficientHistory(String),

    /// Model estimation failed; the diagnostic is preserved verbatim.
    #[error("model fit failed: {0}")]
    FitFailed(String),

    /// Cache store I/O failure. Callers treat the cache as empty.
    #[error("cache error: {0}")]
    Cache(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Earth imagery API error: {0}")]
    EarthEngine(String),

    #[error("weather archive API error: {0}")]
    Meteo(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected fault recovered at the worker boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors that must be rejected synchronously at submission,
    /// before a task id is issued.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::InvalidPeriods(_))
    }
}

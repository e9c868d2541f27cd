//! Shared domain types, configuration, and the unified error type.

pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use error::Error;
pub use provider::SeriesProvider;
pub use types::{
    ConfidenceInterval, DateRange, ForecastResult, Geometry, Location, ModelInfo, SeriesData,
    SeriesKind,
};

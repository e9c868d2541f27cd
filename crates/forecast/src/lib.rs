//! Forecasting: model fitting/forecasting and the cache-aware engine.

pub mod arima;
pub mod engine;
pub mod stats;

pub use arima::FittedModel;
pub use engine::ForecastEngine;
pub use stats::SeriesStats;

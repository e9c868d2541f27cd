//! Seam between the service and external historical-data providers.

use async_trait::async_trait;

use crate::types::{DateRange, Location, SeriesData, SeriesKind};
use crate::Error;

/// A source of dated historical series.
///
/// Implementations wrap one upstream API each; tests substitute
/// deterministic fakes. Provider failures are upstream-data errors from the
/// engine's point of view, never engine faults.
#[async_trait]
pub trait SeriesProvider: Send + Sync {
    async fn get_series(
        &self,
        location: &Location,
        kind: SeriesKind,
        range: &DateRange,
    ) -> Result<SeriesData, Error>;
}

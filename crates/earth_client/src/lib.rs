//! Earth imagery analytics client.
//!
//! Fetches monthly vegetation-index composites (NDVI/EVI/SAVI) for a
//! region of interest from the configured imagery time-series endpoint and
//! converts them to the shared `SeriesData` format.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::config::EarthConfig;
use common::types::{DateRange, Geometry, Location, SeriesData, SeriesKind};
use common::{Error, SeriesProvider};

/// Imagery analytics API client with connection pooling.
#[derive(Debug, Clone)]
pub struct EarthEngineClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

// ── Wire types ────────────────────────────────────────────────────────

/// Request body for `POST /timeseries`.
#[derive(Debug, Serialize)]
struct TimeSeriesRequest<'a> {
    index: &'a str,
    geometry: &'a Geometry,
    start_date: String,
    end_date: String,
}

/// Response from `POST /timeseries`: parallel arrays of monthly composite
/// dates and area-mean index values (null where the month had no usable
/// scenes).
#[derive(Debug, Deserialize)]
pub struct TimeSeriesResponse {
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub values: Vec<Option<f64>>,
}

// ── Implementation ────────────────────────────────────────────────────

impl EarthEngineClient {
    pub fn new(cfg: &EarthConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("landcast/0.1 (forecast service)")
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("failed to build imagery HTTP client");

        Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        }
    }

    /// Fetch a monthly vegetation-index series for a region.
    pub async fn fetch_index_series(
        &self,
        index: SeriesKind,
        geometry: &Geometry,
        range: &DateRange,
    ) -> Result<SeriesData, Error> {
        let url = format!("{}/timeseries", self.base_url);
        let body = TimeSeriesRequest {
            index: index.as_str(),
            geometry,
            start_date: range.start.format("%Y-%m-%d").to_string(),
            end_date: range.end.format("%Y-%m-%d").to_string(),
        };

        debug!(
            "Fetching {} series: {} ({} to {})",
            index.as_str(),
            url,
            body.start_date,
            body.end_date
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::EarthEngine(format!("HTTP error for {}: {}", index.as_str(), e)))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::EarthEngine(format!(
                "imagery API returned {} for {}: {}",
                status,
                index.as_str(),
                &text[..text.len().min(500)]
            )));
        }

        let payload: TimeSeriesResponse = resp
            .json()
            .await
            .map_err(|e| Error::EarthEngine(format!("JSON parse error: {}", e)))?;

        debug!(
            "Got {} monthly composites for {}",
            payload.dates.len(),
            index.as_str()
        );

        into_series(payload)
    }
}

fn into_series(payload: TimeSeriesResponse) -> Result<SeriesData, Error> {
    if payload.dates.len() != payload.values.len() {
        return Err(Error::EarthEngine(format!(
            "mismatched series lengths: {} dates, {} values",
            payload.dates.len(),
            payload.values.len()
        )));
    }
    if payload.dates.is_empty() {
        return Err(Error::EarthEngine("empty time series returned".into()));
    }

    let mut dates = Vec::with_capacity(payload.dates.len());
    for raw in &payload.dates {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| Error::EarthEngine(format!("bad date {raw:?}: {e}")))?;
        dates.push(date);
    }

    Ok(SeriesData {
        dates,
        values: payload.values,
    })
}

#[async_trait]
impl SeriesProvider for EarthEngineClient {
    async fn get_series(
        &self,
        location: &Location,
        kind: SeriesKind,
        range: &DateRange,
    ) -> Result<SeriesData, Error> {
        let geometry = match location {
            Location::Area(geometry) => geometry,
            Location::Point { .. } => {
                return Err(Error::EarthEngine(
                    "imagery provider serves area geometries, not points".into(),
                ));
            }
        };
        if !kind.is_vegetation() {
            return Err(Error::EarthEngine(format!(
                "imagery provider does not serve {} series",
                kind.as_str()
            )));
        }
        self.fetch_index_series(kind, geometry, range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> &'static str {
        r#"{
            "dates": ["2023-01-15", "2023-02-15", "2023-03-15"],
            "values": [0.61, null, 0.58]
        }"#
    }

    #[test]
    fn test_deserialize_timeseries_response() {
        let parsed: TimeSeriesResponse =
            serde_json::from_str(sample_response()).expect("response should deserialize");

        assert_eq!(parsed.dates.len(), 3);
        assert_eq!(parsed.values, vec![Some(0.61), None, Some(0.58)]);
    }

    #[test]
    fn test_into_series_parses_dates_and_keeps_gaps() {
        let parsed: TimeSeriesResponse = serde_json::from_str(sample_response()).unwrap();
        let series = into_series(parsed).expect("series should build");

        assert_eq!(series.len(), 3);
        assert_eq!(
            series.dates[0],
            NaiveDate::parse_from_str("2023-01-15", "%Y-%m-%d").unwrap()
        );
        assert_eq!(series.valid_points().len(), 2);
    }

    #[test]
    fn test_into_series_rejects_mismatched_lengths() {
        let payload = TimeSeriesResponse {
            dates: vec!["2023-01-15".into()],
            values: vec![Some(0.6), Some(0.7)],
        };
        assert!(matches!(
            into_series(payload),
            Err(Error::EarthEngine(_))
        ));
    }

    #[test]
    fn test_into_series_rejects_empty_response() {
        let payload = TimeSeriesResponse {
            dates: vec![],
            values: vec![],
        };
        assert!(matches!(into_series(payload), Err(Error::EarthEngine(_))));
    }

    #[test]
    fn test_into_series_rejects_bad_date() {
        let payload = TimeSeriesResponse {
            dates: vec!["Jan 2023".into()],
            values: vec![Some(0.6)],
        };
        assert!(matches!(into_series(payload), Err(Error::EarthEngine(_))));
    }
}

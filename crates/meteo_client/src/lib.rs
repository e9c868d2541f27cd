//! Weather archive client (Open-Meteo compatible).
//!
//! Fetches daily historical weather for a point and rolls it up to the
//! monthly series the forecasting engine trains on: mean temperature,
//! summed precipitation, stamped mid-month.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use tracing::debug;

use common::config::MeteoConfig;
use common::types::{DateRange, Location, SeriesData, SeriesKind};
use common::{Error, SeriesProvider};

/// Weather archive API client.
#[derive(Debug, Clone)]
pub struct MeteoClient {
    client: reqwest::Client,
    base_url: String,
}

// ── Wire types ────────────────────────────────────────────────────────

/// Response from the archive endpoint.
#[derive(Debug, Deserialize)]
pub struct ArchiveResponse {
    pub daily: DailyBlock,
}

#[derive(Debug, Deserialize)]
pub struct DailyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(rename = "temperature_2m_mean", default)]
    pub temperature: Vec<Option<f64>>,
    #[serde(rename = "precipitation_sum", default)]
    pub precipitation: Vec<Option<f64>>,
}

/// How daily values fold into a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonthlyAgg {
    Mean,
    Sum,
}

// ── Implementation ────────────────────────────────────────────────────

impl MeteoClient {
    pub fn new(cfg: &MeteoConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("landcast/0.1 (forecast service)")
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("failed to build weather HTTP client");

        Self {
            client,
            base_url: cfg.base_url.clone(),
        }
    }

    /// Fetch daily archive rows for a point and date range.
    pub async fn fetch_daily(
        &self,
        lat: f64,
        lon: f64,
        range: &DateRange,
    ) -> Result<ArchiveResponse, Error> {
        let query = [
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            ("start_date", range.start.format("%Y-%m-%d").to_string()),
            ("end_date", range.end.format("%Y-%m-%d").to_string()),
            (
                "daily",
                "temperature_2m_mean,precipitation_sum".to_string(),
            ),
            ("timezone", "UTC".to_string()),
        ];

        debug!("Fetching weather archive: {} ({lat},{lon})", self.base_url);

        let resp = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::Meteo(format!("HTTP error for ({lat},{lon}): {e}")))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Meteo(format!(
                "weather archive returned {} for ({lat},{lon}): {}",
                status,
                &body[..body.len().min(500)]
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::Meteo(format!("JSON parse error for ({lat},{lon}): {e}")))
    }

    /// Fetch and aggregate one weather variable to a monthly series.
    pub async fn get_monthly_series(
        &self,
        lat: f64,
        lon: f64,
        kind: SeriesKind,
        range: &DateRange,
    ) -> Result<SeriesData, Error> {
        let archive = self.fetch_daily(lat, lon, range).await?;
        let daily = &archive.daily;

        let (values, agg) = match kind {
            SeriesKind::Temperature => (&daily.temperature, MonthlyAgg::Mean),
            SeriesKind::Precipitation => (&daily.precipitation, MonthlyAgg::Sum),
            other => {
                return Err(Error::Meteo(format!(
                    "weather archive does not serve {} series",
                    other.as_str()
                )));
            }
        };

        if daily.time.len() != values.len() {
            return Err(Error::Meteo(format!(
                "mismatched archive lengths: {} days, {} values",
                daily.time.len(),
                values.len()
            )));
        }

        let series = aggregate_monthly(&daily.time, values, agg)?;
        if series.is_empty() {
            return Err(Error::Meteo(format!(
                "no {} data for ({lat},{lon})",
                kind.as_str()
            )));
        }
        Ok(series)
    }
}

/// Fold daily values into one mid-month-stamped entry per calendar month,
/// in chronological order. Days with missing values are skipped; a month
/// with no usable days becomes a gap.
fn aggregate_monthly(
    days: &[String],
    values: &[Option<f64>],
    agg: MonthlyAgg,
) -> Result<SeriesData, Error> {
    struct Bucket {
        year: i32,
        month: u32,
        sum: f64,
        count: usize,
    }

    let mut buckets: Vec<Bucket> = Vec::new();
    for (raw, value) in days.iter().zip(values.iter()) {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| Error::Meteo(format!("bad archive date {raw:?}: {e}")))?;

        let needs_new = buckets
            .last()
            .map(|b| b.year != date.year() || b.month != date.month())
            .unwrap_or(true);
        if needs_new {
            buckets.push(Bucket {
                year: date.year(),
                month: date.month(),
                sum: 0.0,
                count: 0,
            });
        }

        if let Some(v) = value {
            if v.is_finite() {
                let bucket = buckets.last_mut().expect("bucket just ensured");
                bucket.sum += v;
                bucket.count += 1;
            }
        }
    }

    let mut series = SeriesData::default();
    for bucket in buckets {
        series.dates.push(
            NaiveDate::from_ymd_opt(bucket.year, bucket.month, 15).expect("mid-month is valid"),
        );
        series.values.push(if bucket.count == 0 {
            None
        } else {
            match agg {
                MonthlyAgg::Mean => Some(bucket.sum / bucket.count as f64),
                MonthlyAgg::Sum => Some(bucket.sum),
            }
        });
    }
    Ok(series)
}

#[async_trait]
impl SeriesProvider for MeteoClient {
    async fn get_series(
        &self,
        location: &Location,
        kind: SeriesKind,
        range: &DateRange,
    ) -> Result<SeriesData, Error> {
        let (lat, lon) = match location {
            Location::Point { lat, lon } => (*lat, *lon),
            Location::Area(_) => {
                return Err(Error::Meteo(
                    "weather archive serves point locations, not areas".into(),
                ));
            }
        };
        self.get_monthly_series(lat, lon, kind, range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> &'static str {
        r#"{
            "daily": {
                "time": ["2024-01-30", "2024-01-31", "2024-02-01", "2024-02-02", "2024-02-03"],
                "temperature_2m_mean": [18.0, 20.0, 21.0, null, 23.0],
                "precipitation_sum": [0.0, 5.5, 2.0, 1.0, null]
            }
        }"#
    }

    #[test]
    fn test_deserialize_archive_response() {
        let parsed: ArchiveResponse =
            serde_json::from_str(sample_response()).expect("response should deserialize");

        assert_eq!(parsed.daily.time.len(), 5);
        assert_eq!(parsed.daily.temperature[3], None);
        assert_eq!(parsed.daily.precipitation[1], Some(5.5));
    }

    #[test]
    fn test_monthly_mean_skips_missing_days() {
        let parsed: ArchiveResponse = serde_json::from_str(sample_response()).unwrap();
        let series =
            aggregate_monthly(&parsed.daily.time, &parsed.daily.temperature, MonthlyAgg::Mean)
                .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(
            series.dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 15).unwrap(),
            ]
        );
        assert_eq!(series.values[0], Some(19.0)); // (18 + 20) / 2
        assert_eq!(series.values[1], Some(22.0)); // (21 + 23) / 2, null skipped
    }

    #[test]
    fn test_monthly_sum_for_precipitation() {
        let parsed: ArchiveResponse = serde_json::from_str(sample_response()).unwrap();
        let series = aggregate_monthly(
            &parsed.daily.time,
            &parsed.daily.precipitation,
            MonthlyAgg::Sum,
        )
        .unwrap();

        assert_eq!(series.values[0], Some(5.5));
        assert_eq!(series.values[1], Some(3.0));
    }

    #[test]
    fn test_month_with_no_usable_days_is_a_gap() {
        let days = vec!["2024-03-01".to_string(), "2024-03-02".to_string()];
        let values = vec![None, None];
        let series = aggregate_monthly(&days, &values, MonthlyAgg::Mean).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series.values[0], None);
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let days = vec!["03/01/2024".to_string()];
        let values = vec![Some(1.0)];
        assert!(matches!(
            aggregate_monthly(&days, &values, MonthlyAgg::Mean),
            Err(Error::Meteo(_))
        ));
    }
}

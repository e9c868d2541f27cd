//! Submit/poll surface consumed by the presentation layer.
//!
//! Input-shape validation is synchronous — a bad request is rejected
//! before any task id exists. Everything after submission (provider
//! fetches, model fits, cache I/O) runs inside the task and is observable
//! only by polling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use common::config::ServiceConfig;
use common::types::{DateRange, Geometry, Location, SeriesData, SeriesKind};
use common::{Error, SeriesProvider};
use compute_cache::fingerprint::{compose_key, spatial_key};
use compute_cache::{CacheDomain, ComputationCache};
use forecast::{ForecastEngine, SeriesStats};
use orchestrator::{TaskCounts, TaskOrchestrator, TaskStatus};

/// Acknowledgement returned by a successful submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedTask {
    pub task_id: String,
    pub status: &'static str,
}

/// Poll response for one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusView {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Persisted shape of a raw historical cache entry: the series plus the
/// summary statistics computed when it was fresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedSeries {
    series: SeriesData,
    #[serde(skip_serializing_if = "Option::is_none")]
    statistics: Option<SeriesStats>,
}

/// Composition root: providers, cache, engine, and orchestrator.
pub struct ForecastService {
    config: ServiceConfig,
    cache: Arc<ComputationCache>,
    engine: Arc<ForecastEngine>,
    orchestrator: TaskOrchestrator,
    earth: Arc<dyn SeriesProvider>,
    meteo: Arc<dyn SeriesProvider>,
}

impl ForecastService {
    pub fn new(
        config: ServiceConfig,
        earth: Arc<dyn SeriesProvider>,
        meteo: Arc<dyn SeriesProvider>,
    ) -> Self {
        let cache = Arc::new(ComputationCache::in_memory(&config.cache));
        let engine = Arc::new(ForecastEngine::new(cache.clone()));
        let timeout = match config.tasks.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            config,
            cache,
            engine,
            orchestrator: TaskOrchestrator::new(timeout),
            earth,
            meteo,
        }
    }

    // ── Submission ────────────────────────────────────────────────────

    /// Start a vegetation-index forecast task for a region.
    pub async fn submit_vegetation_forecast(
        &self,
        geometry: Geometry,
        index: SeriesKind,
        periods: usize,
        seasonal: bool,
        history_years: u32,
    ) -> Result<SubmittedTask, Error> {
        geometry.validate()?;
        if !index.is_vegetation() {
            return Err(Error::InvalidInput(format!(
                "{} is not a vegetation index",
                index.as_str()
            )));
        }
        self.validate_periods(periods)?;
        let range = history_range(history_years)?;

        let spatial = spatial_key(&geometry);
        let model_key = format!("{}:{}", index.as_str(), spatial);

        let cache = self.cache.clone();
        let engine = self.engine.clone();
        let provider = self.earth.clone();
        let location = Location::Area(geometry);

        let task_id = self
            .orchestrator
            .submit(async move {
                let series =
                    fetch_series_cached(&cache, provider.as_ref(), &location, index, &range, &spatial)
                        .await?;
                let result = engine
                    .forecast(&series, periods, Some(&model_key), seasonal)
                    .await?;
                Ok(serde_json::json!({
                    "index": index.as_str(),
                    "region_key": spatial,
                    "forecast": result,
                }))
            })
            .await;

        Ok(SubmittedTask {
            task_id,
            status: "accepted",
        })
    }

    /// Start a weather forecast task for a point. Temperature and
    /// precipitation are forecast concurrently and joined before the task
    /// completes.
    pub async fn submit_weather_forecast(
        &self,
        lat: f64,
        lon: f64,
        periods: usize,
        history_years: u32,
    ) -> Result<SubmittedTask, Error> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::InvalidInput(format!(
                "coordinates out of range: ({lat}, {lon})"
            )));
        }
        self.validate_periods(periods)?;
        let range = history_range(history_years)?;

        let location_key = format!("{lat}_{lon}");
        let cache = self.cache.clone();
        let engine = self.engine.clone();
        let provider = self.meteo.clone();

        let task_id = self
            .orchestrator
            .submit(async move {
                let location = Location::Point { lat, lon };

                let temperature = forecast_weather_variable(
                    &cache,
                    &engine,
                    provider.as_ref(),
                    &location,
                    SeriesKind::Temperature,
                    &range,
                    &location_key,
                    periods,
                );
                let precipitation = forecast_weather_variable(
                    &cache,
                    &engine,
                    provider.as_ref(),
                    &location,
                    SeriesKind::Precipitation,
                    &range,
                    &location_key,
                    periods,
                );
                let (temperature, precipitation) = tokio::join!(temperature, precipitation);
                let temperature = temperature?;
                let precipitation = precipitation?;

                Ok(serde_json::json!({
                    "location": {"lat": lat, "lon": lon},
                    "temperature": temperature,
                    "precipitation": precipitation,
                }))
            })
            .await;

        Ok(SubmittedTask {
            task_id,
            status: "accepted",
        })
    }

    // ── Polling ───────────────────────────────────────────────────────

    /// Task snapshot, or `None` for unknown ids.
    pub async fn task_status(&self, task_id: &str) -> Option<TaskStatusView> {
        let task = self.orchestrator.status(task_id).await?;
        Some(TaskStatusView {
            task_id: task.id.clone(),
            status: task.status,
            duration_secs: task.duration_secs(),
            result: task.result,
            error: task.error,
            start_time: task.started_at,
            end_time: task.ended_at,
        })
    }

    // ── Housekeeping (driven by the daemon loops) ─────────────────────

    /// Purge expired cache entries and prune old finished tasks.
    /// Returns (entries purged, tasks pruned).
    pub async fn run_maintenance(&self) -> (usize, usize) {
        let now = Utc::now();
        let purged = self.cache.purge_expired(now).await;
        let pruned = self
            .orchestrator
            .prune_finished(now, Duration::from_secs(self.config.tasks.retention_secs))
            .await;
        (purged, pruned)
    }

    pub async fn task_counts(&self) -> TaskCounts {
        self.orchestrator.counts().await
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn validate_periods(&self, periods: usize) -> Result<(), Error> {
        let max = self.config.tasks.max_periods;
        if periods == 0 || periods > max {
            return Err(Error::InvalidPeriods(format!(
                "periods must be between 1 and {max}, got {periods}"
            )));
        }
        Ok(())
    }
}

// ── Job internals ─────────────────────────────────────────────────────

/// Raw-series fetch with the cache in front: raw-domain lookup, provider
/// on miss, summary statistics attached, then cached under the raw TTL.
/// Cache problems fall through to the provider.
async fn fetch_series_cached(
    cache: &ComputationCache,
    provider: &dyn SeriesProvider,
    location: &Location,
    kind: SeriesKind,
    range: &DateRange,
    spatial: &str,
) -> Result<SeriesData, Error> {
    let domain = CacheDomain::from(kind);
    let dims = range.cache_dims();
    let key = compose_key(domain, spatial, &[kind.as_str(), &dims]);

    if let Some(entry) = cache.get(domain, &key).await {
        match serde_json::from_value::<CachedSeries>(entry.payload) {
            Ok(cached) => return Ok(cached.series),
            Err(e) => warn!("Discarding undecodable cached series at {}: {}", key, e),
        }
    }

    let series = provider.get_series(location, kind, range).await?;
    if series.valid_points().is_empty() {
        return Err(Error::UpstreamData(format!(
            "provider returned no usable {} observations",
            kind.as_str()
        )));
    }

    let finite: Vec<f64> = series.valid_points().iter().map(|(_, v)| *v).collect();
    let payload = CachedSeries {
        statistics: SeriesStats::compute(&finite),
        series: series.clone(),
    };
    cache
        .put(domain, &key, &dims, serde_json::to_value(&payload)?)
        .await;

    Ok(series)
}

/// One weather sub-forecast: cached fetch plus engine run.
#[allow(clippy::too_many_arguments)]
async fn forecast_weather_variable(
    cache: &ComputationCache,
    engine: &ForecastEngine,
    provider: &dyn SeriesProvider,
    location: &Location,
    kind: SeriesKind,
    range: &DateRange,
    location_key: &str,
    periods: usize,
) -> Result<serde_json::Value, Error> {
    let series = fetch_series_cached(cache, provider, location, kind, range, location_key).await?;
    let result = engine
        .forecast(
            &series,
            periods,
            Some(&format!("{}:{}", kind.as_str(), location_key)),
            false,
        )
        .await?;
    Ok(serde_json::to_value(&result)?)
}

fn history_range(history_years: u32) -> Result<DateRange, Error> {
    let end = Utc::now().date_naive();
    let start = end - chrono::Duration::days(365 * history_years as i64);
    DateRange::new(start, end)
}
